//! tokio-tungstenite-backed frame reader and writer.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::domain::config::{ClientConfig, ConfigError};
use crate::domain::error::{ClientError, ClientResult};
use crate::ports::outbound::{FrameReader, FrameWriter};

/// Origin the server expects from non-browser clients.
const ORIGIN: &str = "http://localhost/";

pub type TcpFrameWriter = WsFrameWriter<MaybeTlsStream<TcpStream>>;
pub type TcpFrameReader = WsFrameReader<MaybeTlsStream<TcpStream>>;

/// Opens `<base_url>/<endpoint>` and splits it into halves.
pub async fn connect(config: &ClientConfig) -> ClientResult<(TcpFrameWriter, TcpFrameReader)> {
    let url = format!("{}/{}", config.base_url(), config.websocket.endpoint.path());
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;

    let headers = request.headers_mut();
    headers.insert("Origin", HeaderValue::from_static(ORIGIN));
    if let Some(key) = &config.access_key {
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| ConfigError::InvalidAccessKey(e.to_string()))?;
        headers.insert("Authorization", bearer);
    }

    debug!(url = %url, "Connecting WebSocket");
    let (stream, response) = connect_async(request)
        .await
        .map_err(|e| ClientError::Connection(format!("failed to connect to {url}: {e}")))?;
    info!(url = %url, status = response.status().as_u16(), "WebSocket connected");

    Ok(split(stream))
}

/// Splits an established stream. Also used for streams accepted in tests.
pub fn split<S>(stream: WebSocketStream<S>) -> (WsFrameWriter<S>, WsFrameReader<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = stream.split();
    (WsFrameWriter { sink }, WsFrameReader { stream })
}

pub struct WsFrameWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> FrameWriter for WsFrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: String) -> ClientResult<()> {
        self.sink
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| ClientError::TransmitFailed(e.to_string()))
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.sink
            .close()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }
}

pub struct WsFrameReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameReader for WsFrameReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> ClientResult<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => warn!(bytes = data.len(), "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "Peer closed WebSocket");
                    return Ok(None);
                }
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ClientError::Connection(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}
