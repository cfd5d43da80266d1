//! Transport contract between the processing role and the board
//!
//! The same link carries frames in and command symbols out. Opening is left
//! to each implementation's constructor; once open, a read timeout and a
//! read failure mean the same thing to the processing loop: no data this
//! tick.

use crate::error::EmgResult;

/// Bidirectional line transport
pub trait Transport: Send {
    /// Read one line. `Ok(None)` means the read timed out.
    fn read_line(&mut self) -> EmgResult<Option<String>>;

    /// Write one encoded command. Must return within the transport's
    /// write timeout.
    fn write(&mut self, bytes: &[u8]) -> EmgResult<()>;

    /// Release the link. Further reads and writes fail.
    fn close(&mut self);

    /// Short description for logs (port name, "simulator", ...)
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_line(&mut self) -> EmgResult<Option<String>> {
        (**self).read_line()
    }

    fn write(&mut self, bytes: &[u8]) -> EmgResult<()> {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
