use super::{Transport, TransportCall, TransportControl, TransportEvent, TransportExit, TransportHandle};
use crate::config::Timeouts;
use crate::error::{PipelineError, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// In-process transport on top of `reqwest`.
///
/// Emits the same event sequence as an external curl process: a synthesized
/// response head, body chunks, and a curl-numbered exit code.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeouts: Timeouts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| PipelineError::TransportUnavailable(e.to_string()))?;
        Ok(Self { http })
    }
}

struct TaskControl {
    task: JoinHandle<()>,
}

impl TransportControl for TaskControl {
    fn interrupt(&mut self) {
        self.task.abort();
    }

    fn kill(&mut self) {
        self.task.abort();
    }
}

impl Drop for TaskControl {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn spawn(&self, call: TransportCall<'_>) -> Result<TransportHandle> {
        let body = std::fs::read(call.body_path).map_err(PipelineError::Staging)?;
        let mut req = self
            .http
            .post(call.url)
            .timeout(call.timeouts.request)
            .body(body);
        for (name, value) in call.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(run(req, tx));
        Ok(TransportHandle::new(rx, Box::new(TaskControl { task })))
    }
}

async fn run(req: reqwest::RequestBuilder, tx: mpsc::Sender<TransportEvent>) {
    let exit = match req.send().await {
        Err(e) => {
            let _ = tx.send(TransportEvent::Stderr(e.to_string().into_bytes())).await;
            TransportExit::code(exit_code_for(&e))
        }
        Ok(resp) => {
            let mut head = format!("{:?} {}\r\n", resp.version(), resp.status().as_u16());
            for (name, value) in resp.headers() {
                head.push_str(&format!("{}: {}\r\n", name, value.to_str().unwrap_or_default()));
            }
            head.push_str("\r\n");
            if tx.send(TransportEvent::Stdout(head.into_bytes())).await.is_err() {
                return;
            }

            let mut code = 0;
            let mut stream = resp.bytes_stream();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        if tx.send(TransportEvent::Stdout(bytes.to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Stderr(e.to_string().into_bytes())).await;
                        code = exit_code_for(&e);
                        break;
                    }
                }
            }
            TransportExit::code(code)
        }
    };
    let _ = tx.send(TransportEvent::Exited(exit)).await;
}

/// Map a client error onto the curl exit code with the same meaning.
fn exit_code_for(e: &reqwest::Error) -> i32 {
    if e.is_timeout() {
        return 28;
    }
    if e.is_builder() {
        return 3;
    }
    if e.is_connect() {
        let detail = format!("{e:?}").to_ascii_lowercase();
        if detail.contains("dns") || detail.contains("resolve") {
            return 6;
        }
        if detail.contains("certificate") || detail.contains("tls") {
            return 35;
        }
        return 7;
    }
    56
}
