//! Command dispatch to the arm
//!
//! Each committed spike becomes exactly one write of the channel's action
//! symbol. Failed writes are counted and logged, never retried.

use crate::config::SessionConfig;
use crate::detector::SpikeEvent;
use emg_core::Transport;
use serde::{Deserialize, Serialize};

/// Counters for outbound commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
    pub resets: u64,
}

/// Maps committed channels to symbols and writes them out
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    actions: Vec<char>,
    reset_symbol: char,
    terminator: Option<char>,
    stats: DispatchStats,
}

impl CommandDispatcher {
    pub fn new(config: &SessionConfig) -> Self {
        CommandDispatcher {
            actions: config.channels.iter().map(|c| c.action).collect(),
            reset_symbol: config.reset_symbol,
            terminator: config.command_terminator,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn action_for(&self, channel: usize) -> Option<char> {
        self.actions.get(channel).copied()
    }

    /// Wire encoding of one symbol
    pub fn encode(&self, symbol: char) -> Vec<u8> {
        let mut buffer = [0u8; 4];
        let mut bytes = symbol.encode_utf8(&mut buffer).as_bytes().to_vec();
        if let Some(terminator) = self.terminator {
            bytes.extend_from_slice(terminator.encode_utf8(&mut buffer).as_bytes());
        }
        bytes
    }

    /// Send the action for a committed spike; returns the symbol if written
    pub fn dispatch<T>(&mut self, event: &SpikeEvent, transport: &mut T) -> Option<char>
    where
        T: Transport + ?Sized,
    {
        let symbol = match self.action_for(event.channel) {
            Some(symbol) => symbol,
            None => {
                tracing::warn!(channel = event.channel, "No action configured for channel");
                return None;
            }
        };

        match transport.write(&self.encode(symbol)) {
            Ok(()) => {
                self.stats.sent += 1;
                tracing::info!(
                    channel = event.channel,
                    timestamp = event.timestamp,
                    "Sent command '{}'",
                    symbol
                );
                Some(symbol)
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(channel = event.channel, "Command '{}' not delivered: {}", symbol, e);
                None
            }
        }
    }

    /// Send the reset symbol regardless of detector state
    pub fn send_reset<T>(&mut self, transport: &mut T) -> bool
    where
        T: Transport + ?Sized,
    {
        match transport.write(&self.encode(self.reset_symbol)) {
            Ok(()) => {
                self.stats.resets += 1;
                tracing::info!("Sent reset '{}'", self.reset_symbol);
                true
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!("Reset '{}' not delivered: {}", self.reset_symbol, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emg_core::{transport_error, EmgResult};

    #[derive(Default)]
    struct RecordingTransport {
        written: Vec<Vec<u8>>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn read_line(&mut self) -> EmgResult<Option<String>> {
            Ok(None)
        }

        fn write(&mut self, bytes: &[u8]) -> EmgResult<()> {
            if self.fail {
                return Err(transport_error!("write timed out"));
            }
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn close(&mut self) {}

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    #[test]
    fn test_dispatch_writes_channel_symbol() {
        let mut dispatcher = CommandDispatcher::new(&SessionConfig::six_channel_arm());
        let mut transport = RecordingTransport::default();

        let sent = dispatcher.dispatch(&SpikeEvent { channel: 3, timestamp: 1.0 }, &mut transport);

        assert_eq!(sent, Some('B'));
        assert_eq!(transport.written, vec![b"B".to_vec()]);
        assert_eq!(dispatcher.stats().sent, 1);
    }

    #[test]
    fn test_terminator_is_appended() {
        let mut config = SessionConfig::six_channel_arm();
        config.command_terminator = Some('\n');
        let dispatcher = CommandDispatcher::new(&config);

        assert_eq!(dispatcher.encode('G'), b"G\n".to_vec());
    }

    #[test]
    fn test_failed_write_is_counted_not_retried() {
        let mut dispatcher = CommandDispatcher::new(&SessionConfig::six_channel_arm());
        let mut transport = RecordingTransport { fail: true, ..Default::default() };

        let sent = dispatcher.dispatch(&SpikeEvent { channel: 0, timestamp: 1.0 }, &mut transport);

        assert_eq!(sent, None);
        assert_eq!(dispatcher.stats(), DispatchStats { sent: 0, failed: 1, resets: 0 });
        assert!(transport.written.is_empty());
    }

    #[test]
    fn test_reset_uses_reset_symbol() {
        let mut dispatcher = CommandDispatcher::new(&SessionConfig::six_channel_arm());
        let mut transport = RecordingTransport::default();

        assert!(dispatcher.send_reset(&mut transport));
        assert_eq!(transport.written, vec![b"Z".to_vec()]);
        assert_eq!(dispatcher.stats().resets, 1);
    }

    #[test]
    fn test_unknown_channel_is_not_sent() {
        let mut dispatcher = CommandDispatcher::new(&SessionConfig::six_channel_arm());
        let mut transport = RecordingTransport::default();

        assert_eq!(dispatcher.dispatch(&SpikeEvent { channel: 9, timestamp: 0.0 }, &mut transport), None);
        assert!(transport.written.is_empty());
    }
}
