//! Values that can be snapshotted
//!
//! Anything implementing [`Assertable`] can be passed to
//! [`Abide::assert`](crate::Abide::assert). Strings are supported directly;
//! the adapters below cover the common cases of `Debug` values, serializable
//! values and raw byte streams.

use serde::Serialize;
use std::fmt;
use std::io::Read;

/// A value with a textual rendering suitable for snapshotting
pub trait Assertable {
    /// Render the value as the text to store or compare
    fn render_as_text(&self) -> String;
}

impl Assertable for str {
    fn render_as_text(&self) -> String {
        self.to_string()
    }
}

impl Assertable for String {
    fn render_as_text(&self) -> String {
        self.clone()
    }
}

impl<T: Assertable + ?Sized> Assertable for &T {
    fn render_as_text(&self) -> String {
        (**self).render_as_text()
    }
}

/// Snapshot a value through its pretty `Debug` output, prefixed by its type
/// name so that a change of type is never mistaken for equal output
pub struct Debugged<T>(pub T);

impl<T: fmt::Debug> Assertable for Debugged<T> {
    fn render_as_text(&self) -> String {
        format!("{} {:#?}", std::any::type_name::<T>(), self.0)
    }
}

/// Snapshot a value as pretty-printed JSON
pub struct Json<T>(pub T);

impl<T: Serialize> Assertable for Json<T> {
    fn render_as_text(&self) -> String {
        serde_json::to_string_pretty(&self.0)
            .unwrap_or_else(|e| format!("<unserializable: {}>", e))
    }
}

/// Raw captured bytes, rendered as lossy UTF-8
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Drain a reader into memory
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Bytes(data))
    }
}

impl Assertable for Bytes {
    fn render_as_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}
