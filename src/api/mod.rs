pub mod oauth;
pub mod openai;
pub mod youtube;

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse().ok())
            .unwrap_or(0)
    }

    async fn read_request(sock: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = match sock.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                if buf.len() >= pos + 4 + content_length(&head) {
                    break;
                }
            }
        }
        buf
    }

    async fn write_reply(sock: &mut TcpStream, status: &str, body: &str) {
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
            status,
            body.len()
        );
        let reply = format!("{}Connection: close\r\n\r\n{}", head, body);
        let _ = sock.write_all(reply.as_bytes()).await;
        let _ = sock.shutdown().await;
    }

    /// Answers a single request with `status` and `body`; the handle yields
    /// the raw request bytes.
    pub async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_request(&mut sock).await;
            write_reply(&mut sock, status, &body).await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    /// Answers one request per reply, in order. The handle yields each
    /// request line, e.g. `GET /search?search=Dune HTTP/1.1`.
    pub async fn serve_sequence(
        replies: Vec<(&'static str, String)>,
    ) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut lines = Vec::new();
            for (status, body) in replies {
                let (mut sock, _) = listener.accept().await.unwrap();
                let request = read_request(&mut sock).await;
                let text = String::from_utf8_lossy(&request).to_string();
                lines.push(text.lines().next().unwrap_or_default().to_string());
                write_reply(&mut sock, status, &body).await;
            }
            lines
        });
        (format!("http://{}", addr), handle)
    }

    pub async fn one_shot_server(status: &'static str, body: String) -> String {
        serve_once(status, body).await.0
    }
}
