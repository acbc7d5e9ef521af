use std::io::Cursor;

use bytes::{Buf, BytesMut};
use thiserror::Error as ThisError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{self, Request, Response};

#[derive(Debug, ThisError)]
pub enum ReadError {
    /// The frame was malformed. Its bytes were consumed, so the connection
    /// can keep serving at the next frame boundary.
    #[error(transparent)]
    Protocol(protocol::Error),
    /// The peer closed the connection in the middle of a frame.
    /// `body_truncated` is true when a complete header declared more payload
    /// bytes than ever arrived.
    #[error("connection closed mid-frame")]
    UnexpectedEof { body_truncated: bool },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Connection {
    stream: TcpStream,
    // Data is read from the socket into the read buffer. When a frame is parsed, the corresponding
    // data is removed from the buffer.
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection {
            stream,
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Reads one request frame. `Ok(None)` means the peer closed the
    /// connection cleanly between frames.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ReadError> {
        self.read_frame(Request::parse).await
    }

    /// Reads one response frame (the client side of the codec).
    pub async fn read_response(&mut self) -> Result<Option<Response>, ReadError> {
        self.read_frame(Response::parse).await
    }

    async fn read_frame<T>(
        &mut self,
        parse: fn(&mut Cursor<&[u8]>) -> Result<T, protocol::Error>,
    ) -> Result<Option<T>, ReadError> {
        loop {
            let in_body;
            let mut cursor = Cursor::new(&self.buffer[..]);
            match parse(&mut cursor) {
                Ok(frame) => {
                    let consumed = cursor.position() as usize;
                    self.buffer.advance(consumed);
                    return Ok(Some(frame));
                }
                // Not enough buffered data for a whole frame; the peer may
                // deliver it in arbitrarily small fragments.
                Err(protocol::Error::Incomplete { in_body: body }) => in_body = body,
                Err(err) => {
                    let consumed = cursor.position() as usize;
                    self.buffer.advance(consumed);
                    return Err(ReadError::Protocol(err));
                }
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ReadError::UnexpectedEof {
                    body_truncated: in_body,
                });
            }
        }
    }

    pub async fn write_request(&mut self, request: &Request) -> std::io::Result<()> {
        self.stream.write_all(&request.serialize()).await
    }

    pub async fn write_response(&mut self, response: &Response) -> std::io::Result<()> {
        self.stream.write_all(&response.serialize()).await
    }
}
