//! Length-prefixed, native-endian framing over an async stream.
//!
//! Every worker is built against the same machine as the tracker, so
//! integers cross the wire in the platform's native byte order rather
//! than a canonical one — there is deliberately no `to_be`/`from_be`
//! anywhere in this module.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TrackerError};

/// Magic number exchanged at the start of every connection to guard
/// against a non-tracker peer on the wrong port.
pub const MAGIC: i32 = 0xFF99;

/// A thin wrapper around an async duplex stream that speaks the
/// tracker's framing: fixed-width native-endian `i32`s and
/// length-prefixed UTF-8 strings.
pub struct Framed<S> {
    stream: S,
}

impl<S> Framed<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads exactly `n` bytes, looping until satisfied. A short read
    /// before `n` bytes (peer closed early) is a fatal I/O error.
    async fn read_exact_n(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    pub async fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.stream.read_exact(&mut buf).await?;
        Ok(i32::from_ne_bytes(buf))
    }

    pub async fn write_i32(&mut self, value: i32) -> Result<()> {
        self.stream.write_all(&value.to_ne_bytes()).await?;
        Ok(())
    }

    pub async fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32().await?;
        let len = usize::try_from(len).map_err(|_| {
            TrackerError::ProtocolViolation(format!("negative string length {len}"))
        })?;
        let bytes = self.read_exact_n(len).await?;
        String::from_utf8(bytes)
            .map_err(|e| TrackerError::ProtocolViolation(format!("non-UTF-8 string: {e}")))
    }

    pub async fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_i32(i32::try_from(s.len()).map_err(|_| {
            TrackerError::ProtocolViolation(format!("string too long: {} bytes", s.len()))
        })?)
        .await?;
        self.stream.write_all(s.as_bytes()).await?;
        Ok(())
    }

    /// Reads and verifies the magic exchange, then echoes it back.
    pub async fn magic_handshake(&mut self) -> Result<()> {
        let got = self.read_i32().await?;
        if got != MAGIC {
            return Err(TrackerError::BadMagic {
                expected: MAGIC,
                got,
            });
        }
        self.write_i32(MAGIC).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn int_round_trip() {
        let (a, b) = duplex(64);
        let mut writer = Framed::new(a);
        let mut reader = Framed::new(b);
        writer.write_i32(-42).await.unwrap();
        assert_eq!(reader.read_i32().await.unwrap(), -42);
    }

    #[tokio::test]
    async fn string_round_trip() {
        let (a, b) = duplex(64);
        let mut writer = Framed::new(a);
        let mut reader = Framed::new(b);
        writer.write_string("hello world").await.unwrap();
        assert_eq!(reader.read_string().await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn magic_handshake_rejects_wrong_value() {
        let (a, b) = duplex(64);
        let mut worker = Framed::new(a);
        let mut tracker = Framed::new(b);
        worker.write_i32(0xDEAD).await.unwrap();
        let err = tracker.magic_handshake().await.unwrap_err();
        assert!(matches!(err, TrackerError::BadMagic { got: 0xDEAD, .. }));
    }
}
