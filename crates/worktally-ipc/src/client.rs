//! Client side of the worktallyd socket

use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use worktally_api::{
    Command, ErrorInfo, Event, Request, Response, ResponsePayload, ResponseResult, API_VERSION,
};

use crate::{IpcError, IpcResult};

/// Reads NDJSON frames, skipping blank keepalive lines
struct LineReader {
    inner: BufReader<OwnedReadHalf>,
    line: String,
}

impl LineReader {
    fn new(read_half: OwnedReadHalf) -> Self {
        Self {
            inner: BufReader::new(read_half),
            line: String::new(),
        }
    }

    async fn next_frame(&mut self) -> IpcResult<&str> {
        loop {
            self.line.clear();
            if self.inner.read_line(&mut self.line).await? == 0 {
                return Err(IpcError::ConnectionClosed);
            }
            if !self.line.trim().is_empty() {
                return Ok(self.line.trim());
            }
        }
    }
}

/// A connection to worktallyd that issues one request at a time
pub struct IpcClient {
    reader: LineReader,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let (read_half, writer) = UnixStream::connect(socket_path).await?.into_split();
        Ok(Self {
            reader: LineReader::new(read_half),
            writer,
            next_request_id: 1,
        })
    }

    /// Send `command` and wait for the matching response.
    ///
    /// A response for another request id or API version is an
    /// `InvalidMessage` error.
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut frame = serde_json::to_vec(&Request::new(request_id, command))?;
        frame.push(b'\n');
        self.writer.write_all(&frame).await?;

        let response: Response = serde_json::from_str(self.reader.next_frame().await?)?;
        if response.request_id != request_id {
            return Err(IpcError::InvalidMessage(format!(
                "expected response to request {}, got {}",
                request_id, response.request_id
            )));
        }
        if response.api_version != API_VERSION {
            return Err(IpcError::InvalidMessage(format!(
                "daemon speaks API version {}, this client speaks {}",
                response.api_version, API_VERSION
            )));
        }
        Ok(response)
    }

    /// Like [`send`](Self::send), but returns the error info of a rejected
    /// request as the inner `Err`.
    pub async fn call(
        &mut self,
        command: Command,
    ) -> IpcResult<Result<ResponsePayload, ErrorInfo>> {
        Ok(match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(info) => Err(info),
        })
    }

    /// Turn this connection into a stream of broadcast events
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        if let Err(info) = self.call(Command::SubscribeEvents).await? {
            return Err(IpcError::ServerError(info.message));
        }
        Ok(EventStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }
}

/// Events pushed by worktallyd to a subscribed connection
pub struct EventStream {
    reader: LineReader,
    // dropping the write half would shut the socket down and end the subscription
    _writer: OwnedWriteHalf,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        Ok(serde_json::from_str(self.reader.next_frame().await?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::net::UnixListener;
    use worktally_api::{ErrorCode, EventPayload};

    /// Accept one connection and answer each request line with `reply(request)`
    fn answer_with(
        listener: UnixListener,
        reply: fn(Request) -> Vec<String>,
    ) -> tokio::task::JoinHandle<bool> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Some(line) = lines.next_line().await.unwrap() {
                let request: Request = serde_json::from_str(&line).unwrap();
                for out in reply(request) {
                    write_half.write_all(out.as_bytes()).await.unwrap();
                    write_half.write_all(b"\n").await.unwrap();
                }
            }
            // true once the client hung up
            true
        })
    }

    #[tokio::test]
    async fn call_separates_rejections_from_transport_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wt.sock");
        let listener = UnixListener::bind(&path).unwrap();
        answer_with(listener, |request| {
            let response = match request.command {
                Command::Ping => Response::success(request.request_id, ResponsePayload::Pong),
                _ => Response::error(
                    request.request_id,
                    ErrorInfo::new(ErrorCode::PermissionDenied, "nope"),
                ),
            };
            vec![String::new(), serde_json::to_string(&response).unwrap()]
        });

        let mut client = IpcClient::connect(&path).await.unwrap();
        assert!(matches!(client.call(Command::Ping).await, Ok(Ok(ResponsePayload::Pong))));
        let rejected = client.call(Command::ReloadConfig).await.unwrap().unwrap_err();
        assert_eq!(rejected.message, "nope");
    }

    #[tokio::test]
    async fn mismatched_request_id_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wt.sock");
        let listener = UnixListener::bind(&path).unwrap();
        answer_with(listener, |request| {
            let response = Response::success(request.request_id + 7, ResponsePayload::Pong);
            vec![serde_json::to_string(&response).unwrap()]
        });

        let mut client = IpcClient::connect(&path).await.unwrap();
        assert!(matches!(
            client.send(Command::Ping).await,
            Err(IpcError::InvalidMessage(_))
        ));
    }

    #[tokio::test]
    async fn event_stream_keeps_the_connection_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wt.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let peer = answer_with(listener, |request| {
            let subscribed = Response::success(
                request.request_id,
                ResponsePayload::Subscribed {
                    client_id: worktally_util::ClientId::new(),
                },
            );
            let event = Event::new(EventPayload::ConfigReloaded);
            vec![
                serde_json::to_string(&subscribed).unwrap(),
                serde_json::to_string(&event).unwrap(),
            ]
        });

        let client = IpcClient::connect(&path).await.unwrap();
        let mut events = client.subscribe().await.unwrap();
        let event = events.next().await.unwrap();
        assert!(matches!(event.payload, EventPayload::ConfigReloaded));
        assert!(!peer.is_finished());

        drop(events);
        assert!(peer.await.unwrap());
    }
}
