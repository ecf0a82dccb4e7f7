//! RTSP/1.0 framing over a TCP socket: request/response exchange and the
//! `$`-prefixed interleaved binary frames RTP/RTCP travel in once a session
//! has been `SETUP` for TCP transport.

use std::io;

use rtsp_types::{Message, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{AppError, Result};

/// One interleaved binary frame: `$`, channel id, 16-bit BE length, payload.
pub struct InterleavedFrame {
    pub channel: u8,
    pub payload: Vec<u8>,
}

/// Either a parsed RTSP message or a demultiplexed binary frame, as read off
/// the wire in whatever order the peer sends them.
pub enum WireEvent {
    Request(Request<Vec<u8>>),
    Response(Response<Vec<u8>>),
    Frame(InterleavedFrame),
}

/// Wraps a TCP connection with RTSP message/frame framing. Both the server
/// and the client dialer share this.
pub struct RtspConn {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl RtspConn {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Read the next frame or RTSP message from the wire.
    pub async fn read_event(&mut self) -> Result<WireEvent> {
        let marker = self.reader.read_u8().await.map_err(io_err)?;

        if marker == b'$' {
            let channel = self.reader.read_u8().await.map_err(io_err)?;
            let len = self.reader.read_u16().await.map_err(io_err)? as usize;
            let mut payload = vec![0u8; len];
            self.reader.read_exact(&mut payload).await.map_err(io_err)?;
            return Ok(WireEvent::Frame(InterleavedFrame { channel, payload }));
        }

        let mut head = vec![marker];
        read_until_headers_end(&mut self.reader, &mut head).await?;

        let content_length = parse_content_length(&head).unwrap_or(0);
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            self.reader.read_exact(&mut body).await.map_err(io_err)?;
        }

        let mut full = head;
        full.extend_from_slice(&body);

        match Message::parse(&full) {
            Ok((Message::Request(req), _)) => Ok(WireEvent::Request(req.map_body(|_| body))),
            Ok((Message::Response(res), _)) => Ok(WireEvent::Response(res.map_body(|_| body))),
            Ok((Message::Data(_), _)) => Err(AppError::Protocol(
                "unexpected interleaved data outside $ framing".to_string(),
            )),
            Err(err) => Err(AppError::Protocol(format!("malformed RTSP message: {err}"))),
        }
    }

    pub async fn write_response(&mut self, response: &Response<Vec<u8>>) -> Result<()> {
        let bytes = response.clone().into_body().into_iter().collect::<Vec<u8>>();
        let mut head = Vec::new();
        response
            .clone()
            .replace_body(Vec::<u8>::new())
            .write(&mut head)
            .map_err(io_err)?;
        self.writer.write_all(&head).await.map_err(io_err)?;
        self.writer.write_all(&bytes).await.map_err(io_err)?;
        self.writer.flush().await.map_err(io_err)?;
        Ok(())
    }

    pub async fn write_request(&mut self, request: &Request<Vec<u8>>) -> Result<()> {
        let bytes = request.clone().into_body();
        let mut head = Vec::new();
        request
            .clone()
            .replace_body(Vec::<u8>::new())
            .write(&mut head)
            .map_err(io_err)?;
        self.writer.write_all(&head).await.map_err(io_err)?;
        self.writer.write_all(&bytes).await.map_err(io_err)?;
        self.writer.flush().await.map_err(io_err)?;
        Ok(())
    }

    pub async fn write_frame(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        let mut head = [0u8; 4];
        head[0] = b'$';
        head[1] = channel;
        head[2..4].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        self.writer.write_all(&head).await.map_err(io_err)?;
        self.writer.write_all(payload).await.map_err(io_err)?;
        self.writer.flush().await.map_err(io_err)?;
        Ok(())
    }
}

fn io_err(err: io::Error) -> AppError {
    AppError::Io(err)
}

async fn read_until_headers_end<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let mut window = [0u8; 1];
    loop {
        if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
            return Ok(());
        }
        let n = tokio::io::AsyncReadExt::read(reader, &mut window)
            .await
            .map_err(io_err)?;
        if n == 0 {
            return Err(AppError::Protocol("connection closed mid-message".to_string()));
        }
        buf.push(window[0]);
    }
}

fn parse_content_length(head: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(head);
    text.lines()
        .find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse().ok())
}
