use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest tag accepted from the wire.
pub const MAX_TAG_LEN: usize = 1024;

/// Largest body accepted from the wire (and produced by uploads).
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// One unit on the wire: a tag naming the message kind plus an opaque body.
///
/// Layout is `[tagLen:u32][tag][bodyLen:u32][body]`, both prefixes big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: String,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(tag: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            tag: tag.into(),
            body,
        }
    }

    /// A frame whose body carries no payload fields.
    pub fn empty(tag: impl Into<String>) -> Self {
        Self::new(tag, Vec::new())
    }

    /// Checks the frame against the limits `read_frame` enforces, so nothing
    /// is written that the other side would refuse.
    pub fn check_limits(&self) -> io::Result<()> {
        if self.tag.is_empty() {
            return Err(invalid_data("frame tag is empty".to_string()));
        }
        if self.tag.len() > MAX_TAG_LEN {
            return Err(invalid_data(format!(
                "frame tag length {} exceeds {MAX_TAG_LEN}",
                self.tag.len()
            )));
        }
        if self.body.len() > MAX_BODY_LEN {
            return Err(invalid_data(format!(
                "frame body length {} exceeds {MAX_BODY_LEN}",
                self.body.len()
            )));
        }
        Ok(())
    }

    /// Wire bytes of the frame. Lengths are only meaningful for frames that
    /// pass [`Frame::check_limits`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.tag.len() + self.body.len());
        buf.extend_from_slice(&(self.tag.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.tag.as_bytes());
        buf.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// Reads the next frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary. An end
/// of stream anywhere inside a frame surfaces as `UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let first = reader.read(&mut prefix).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut prefix[first..]).await?;

    let tag_len = u32::from_be_bytes(prefix) as usize;
    if tag_len == 0 {
        return Err(invalid_data("frame tag is empty".to_string()));
    }
    if tag_len > MAX_TAG_LEN {
        return Err(invalid_data(format!(
            "frame tag length {tag_len} exceeds {MAX_TAG_LEN}"
        )));
    }
    let mut tag = vec![0u8; tag_len];
    reader.read_exact(&mut tag).await?;
    let tag = String::from_utf8(tag).map_err(|err| invalid_data(err.to_string()))?;

    let body_len = reader.read_u32().await? as usize;
    if body_len > MAX_BODY_LEN {
        return Err(invalid_data(format!(
            "frame body length {body_len} exceeds {MAX_BODY_LEN}"
        )));
    }
    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;

    Ok(Some(Frame { tag, body }))
}

/// Writes one whole frame and flushes it.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    frame.check_limits()?;
    // Single buffer so a frame is never interleaved with another on the wire.
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_frames_including_empty_body() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let frames = vec![
            Frame::new("signUp", b"\x0a\x05alice".to_vec()),
            Frame::empty("refreshGroup"),
            Frame::new("download", vec![0, 255, 7]),
        ];

        for frame in &frames {
            write_frame(&mut writer, frame).await.expect("write frame");
        }
        drop(writer);

        for expected in &frames {
            let parsed = read_frame(&mut reader)
                .await
                .expect("read frame")
                .expect("expected frame");
            assert_eq!(&parsed, expected);
        }
        assert!(read_frame(&mut reader).await.expect("clean eof").is_none());
    }

    #[test]
    fn encodes_big_endian_length_prefixes() {
        let encoded = Frame::new("auth", vec![9]).encode();
        assert_eq!(
            encoded,
            vec![0, 0, 0, 4, b'a', b'u', b't', b'h', 0, 0, 0, 1, 9]
        );
    }

    #[tokio::test]
    async fn eof_inside_frame_is_an_error() {
        let mut bytes = Frame::new("group", vec![1, 2, 3, 4]).encode();
        bytes.truncate(bytes.len() - 2);
        let mut reader = bytes.as_slice();

        let err = read_frame(&mut reader).await.expect_err("truncated frame");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn rejects_oversized_tag_length() {
        let bytes = (MAX_TAG_LEN as u32 + 1).to_be_bytes();
        let mut reader = &bytes[..];

        let err = read_frame(&mut reader).await.expect_err("oversized tag");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn rejects_empty_tag_on_write() {
        let (mut writer, _reader) = tokio::io::duplex(64);
        let err = write_frame(&mut writer, &Frame::empty(""))
            .await
            .expect_err("empty tag");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn write_refuses_tags_the_reader_would_reject() {
        let (mut writer, mut reader) = tokio::io::duplex(4096);
        let frame = Frame::empty("t".repeat(MAX_TAG_LEN + 1));

        let err = write_frame(&mut writer, &frame)
            .await
            .expect_err("oversized tag");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        // Nothing reached the stream; the longest legal tag still goes through.
        let longest = Frame::empty("t".repeat(MAX_TAG_LEN));
        write_frame(&mut writer, &longest).await.expect("longest tag");
        drop(writer);
        let parsed = read_frame(&mut reader).await.expect("read").expect("frame");
        assert_eq!(parsed, longest);
        assert!(read_frame(&mut reader).await.expect("clean eof").is_none());
    }
}
