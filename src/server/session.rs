// Socket address of the peer, used for logging
use std::net::SocketAddr;

use std::io;
use std::sync::Arc;

// Local time for message timestamps
use chrono::Local;

// Buffered, line-by-line async reading and writing
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::ServerConfig;
use crate::error::{ChatError, Result};
use crate::logger::Logger;
use crate::server::banner::stream_banner;
use crate::server::message::{ERASE_PREVIOUS_LINE, chat_line, clean_line, join_announcement};
use crate::server::state::{ChatState, ClientWriter, Session, client_writer};

/// Splits the TCP stream and runs the session on its two halves.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: &ChatState,
    config: &ServerConfig,
    logger: &Logger,
) -> Result<()> {
    let (reader_half, writer_half) = stream.into_split();
    run_session(
        BufReader::new(reader_half),
        client_writer(writer_half),
        peer,
        state,
        config,
        logger,
    )
    .await
}

/// Drives one connection through its whole life:
/// 1. Greeting: welcome line, banner, name prompt
/// 2. Name handshake
/// 3. Join: register, announce, replay history
/// 4. Read loop: every line becomes a timestamped broadcast
/// 5. Deregister and close, however the read loop ended
///
/// Returns an error when the session ended before becoming active (banner
/// failure, peer gone before naming itself) or when a write to this client
/// failed.
pub async fn run_session<R>(
    mut reader: R,
    mut writer: ClientWriter,
    peer: SocketAddr,
    state: &ChatState,
    config: &ServerConfig,
    logger: &Logger,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    // Greeting. Nothing reaches the client until the prompt is flushed, so a
    // banner failure just closes the socket.
    writer.write_all(config.welcome_message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    stream_banner(&config.banner_path, &mut writer).await?;
    writer.write_all(config.name_prompt.as_bytes()).await?;
    writer.flush().await?;

    let mut buf = Vec::new();
    let name = read_line(&mut reader, &mut buf)
        .await?
        .ok_or(ChatError::HandshakeAborted)?;

    let session = Session::new(name, peer, writer);
    logger.info(&format!("👤 {} is now known as '{}'", peer, session.name()));

    let outcome = chat(&mut reader, &mut buf, &session, state, config, logger).await;

    state.remove(&session).await;
    session.close().await;
    logger.info(&format!("👋 {} has left the chat", session.name()));

    outcome
}

/// Active state: join, then relay lines until the read side fails or the
/// registry drops the session.
async fn chat<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    session: &Arc<Session>,
    state: &ChatState,
    config: &ServerConfig,
    logger: &Logger,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let announcement = join_announcement(session.name(), &Local::now());
    logger.info(&announcement);
    state.join(session.clone(), &announcement).await?;

    loop {
        if config.erase_input_echo {
            session.queue(ERASE_PREVIOUS_LINE).await?;
        }

        // A failed write elsewhere may drop this session while it sits idle
        let read = tokio::select! {
            read = read_line(reader, buf) => read,
            _ = session.evicted() => {
                logger.info(&format!("🚫 {} was dropped by the relay", session.peer()));
                break;
            }
        };

        match read {
            Ok(Some(text)) => {
                let line = chat_line(session.name(), &text, &Local::now());
                logger.info(&format!("📨 {}", line));
                state.publish(&line).await;
            }
            Ok(None) => {
                logger.info(&format!("⚠️ {} disconnected gracefully.", session.peer()));
                break;
            }
            Err(e) => {
                logger.warn(&format!("❌ Error reading from {}: {}", session.peer(), e));
                break;
            }
        }
    }

    Ok(())
}

/// Read one `\n`-terminated line. `None` means EOF; a trailing fragment
/// without a terminator counts as EOF too and is discarded.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    reader.read_until(b'\n', buf).await?;
    if buf.last() != Some(&b'\n') {
        return Ok(None);
    }
    Ok(Some(clean_line(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::message::TIMESTAMP_FORMAT;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    struct Client {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn read_until(&mut self, needle: &str) -> String {
            let mut seen = Vec::new();
            while !seen.ends_with(needle.as_bytes()) {
                seen.push(self.reader.read_u8().await.expect("connection closed early"));
            }
            String::from_utf8(seen).unwrap()
        }

        async fn line(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line.trim_end_matches('\n').to_string()
        }

        async fn send(&mut self, text: &str) {
            self.writer.write_all(text.as_bytes()).await.unwrap();
        }
    }

    fn banner() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "*** logo ***").unwrap();
        file
    }

    fn config(banner: &std::path::Path) -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            banner_path: banner.to_path_buf(),
            erase_input_echo: false,
            ..ServerConfig::default()
        })
    }

    fn connect(state: Arc<ChatState>, config: Arc<ServerConfig>) -> (Client, JoinHandle<Result<()>>) {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        let (sr, sw) = tokio::io::split(server_side);
        let (cr, cw) = tokio::io::split(client_side);
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();

        let handle = tokio::spawn(async move {
            run_session(BufReader::new(sr), client_writer(sw), peer, &state, &config, &Logger).await
        });

        (Client { reader: BufReader::new(cr), writer: cw }, handle)
    }

    fn assert_timestamp(line: &str) {
        let stamp = &line[1..20];
        assert!(
            chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok(),
            "bad timestamp in {:?}",
            line
        );
    }

    #[tokio::test]
    async fn test_greeting_then_join_then_echo() {
        let banner = banner();
        let state = Arc::new(ChatState::new(10, Logger));
        let (mut client, handle) = connect(state.clone(), config(banner.path()));

        let greeting = client.read_until("[ENTER YOUR NAME]:").await;
        assert_eq!(greeting, "Welcome to TCP-Chat!\n*** logo ***\n[ENTER YOUR NAME]:");

        client.send("alice  \n").await;
        let joined = client.line().await;
        assert_timestamp(&joined);
        assert!(joined.ends_with("] alice joined the chat!"), "{:?}", joined);

        client.send("hello world \r\n").await;
        let echoed = client.line().await;
        assert_timestamp(&echoed);
        assert!(echoed.ends_with("][alice]: hello world"), "{:?}", echoed);

        assert_eq!(state.session_count().await, 1);
        assert_eq!(state.history().await, vec![echoed]);

        drop(client);
        handle.await.unwrap().unwrap();
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_eof_before_name_is_not_registered() {
        let banner = banner();
        let state = Arc::new(ChatState::new(10, Logger));
        let (mut client, handle) = connect(state.clone(), config(banner.path()));

        client.read_until("[ENTER YOUR NAME]:").await;
        drop(client);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ChatError::HandshakeAborted)));
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_banner_closes_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(ChatState::new(10, Logger));
        let (mut client, handle) = connect(state.clone(), config(&dir.path().join("logo.txt")));

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ChatError::Banner { .. })));

        let mut rest = Vec::new();
        client.reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_dropped() {
        let banner = banner();
        let state = Arc::new(ChatState::new(10, Logger));
        let (mut client, handle) = connect(state.clone(), config(banner.path()));

        client.read_until("[ENTER YOUR NAME]:").await;
        client.send("bob\n").await;
        client.line().await;
        client.send("no newline").await;
        client.writer.shutdown().await.unwrap();

        handle.await.unwrap().unwrap();
        assert!(state.history().await.is_empty());
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_erase_sequence_precedes_next_line() {
        let banner = banner();
        let state = Arc::new(ChatState::new(10, Logger));
        let config = Arc::new(ServerConfig {
            banner_path: banner.path().to_path_buf(),
            erase_input_echo: true,
            ..ServerConfig::default()
        });
        let (mut client, handle) = connect(state, config);

        client.read_until("[ENTER YOUR NAME]:").await;
        client.send("carol\n").await;
        client.line().await;
        client.send("hi\n").await;

        let echoed = client.line().await;
        assert!(echoed.starts_with(ERASE_PREVIOUS_LINE), "{:?}", echoed);
        assert!(echoed.ends_with("][carol]: hi"));

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_session_ends_when_its_output_breaks() {
        let banner = banner();
        let state = Arc::new(ChatState::new(10, Logger));
        let config = config(banner.path());

        // Separate pipes so the output can break while the input stays open
        let (mut input, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_out) = tokio::io::duplex(64 * 1024);
        let peer: SocketAddr = "127.0.0.1:5556".parse().unwrap();

        let session_state = state.clone();
        let handle = tokio::spawn(async move {
            run_session(BufReader::new(server_in), client_writer(server_out), peer, &session_state, &config, &Logger)
                .await
        });

        let mut output = BufReader::new(client_out);
        let mut greeting = Vec::new();
        while !greeting.ends_with(b"[ENTER YOUR NAME]:") {
            greeting.push(output.read_u8().await.unwrap());
        }
        input.write_all(b"dave\n").await.unwrap();
        let mut joined = String::new();
        output.read_line(&mut joined).await.unwrap();
        assert!(joined.ends_with("] dave joined the chat!\n"), "{:?}", joined);
        drop(output);

        assert_eq!(state.publish("someone else talking").await, 0);
        assert_eq!(state.session_count().await, 0);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("session kept running")
            .unwrap()
            .unwrap();
        drop(input);
    }

    #[tokio::test]
    async fn test_empty_name_is_accepted() {
        let banner = banner();
        let state = Arc::new(ChatState::new(10, Logger));
        let (mut client, handle) = connect(state.clone(), config(banner.path()));

        client.read_until("[ENTER YOUR NAME]:").await;
        client.send("\n").await;
        let joined = client.line().await;
        assert!(joined.ends_with("]  joined the chat!"), "{:?}", joined);
        assert_eq!(state.session_count().await, 1);

        drop(client);
        handle.await.unwrap().unwrap();
    }
}
