use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, Notify};

use crate::logger::Logger;
use crate::server::history::HistoryBuffer;

/// Buffered write half of one client connection. Boxed so sessions backed by
/// a TCP socket and by an in-memory pipe share one type.
pub type ClientWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Box and buffer any write half.
pub fn client_writer<W>(writer: W) -> ClientWriter
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
    BufWriter::new(boxed)
}

/// One connected client that has completed the name handshake.
///
/// Its handler owns the read half; the registry only ever writes to it.
/// Two sessions are the same session only if they are the same `Arc`.
pub struct Session {
    name: String,
    peer: SocketAddr,
    writer: Mutex<ClientWriter>,
    evicted: Notify,
}

impl Session {
    pub fn new(name: impl Into<String>, peer: SocketAddr, writer: ClientWriter) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            peer,
            writer: Mutex::new(writer),
            evicted: Notify::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write `message` plus a newline and flush right away.
    pub async fn send_line(&self, message: &str) -> io::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(message.as_bytes()).await?;
        w.write_all(b"\n").await?;
        w.flush().await
    }

    /// Buffer `text` without flushing; it goes out ahead of the next line sent.
    pub async fn queue(&self, text: &str) -> io::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(text.as_bytes()).await
    }

    /// Flush what is left and shut the write half down. Errors are ignored,
    /// the peer may already be gone.
    pub async fn close(&self) {
        let mut w = self.writer.lock().await;
        let _ = w.flush().await;
        let _ = w.shutdown().await;
    }

    /// Resolves once the registry has dropped this session after a failed
    /// write. Also resolves if that happened before the call.
    pub async fn evicted(&self) {
        self.evicted.notified().await
    }
}

/// Everything guarded by the one shared lock. Each method is one step; the
/// `ChatState` operations hold the lock across however many steps they need.
struct Members {
    sessions: Vec<Arc<Session>>,
    history: HistoryBuffer,
}

impl Members {
    fn push(&mut self, session: Arc<Session>) {
        self.sessions.push(session);
    }

    fn remove(&mut self, session: &Arc<Session>) -> bool {
        match self.sessions.iter().position(|s| Arc::ptr_eq(s, session)) {
            Some(index) => {
                self.sessions.remove(index);
                true
            }
            None => false,
        }
    }

    /// Send `message` to every session and return how many it reached.
    /// Sessions whose write fails are dropped before returning, so one broken
    /// recipient costs a single failed write.
    async fn deliver(&mut self, message: &str, logger: &Logger) -> usize {
        let mut failed = Vec::new();
        for session in &self.sessions {
            if let Err(e) = session.send_line(message).await {
                logger.warn(&format!(
                    "❌ Failed to send to {} ({}): {}",
                    session.name(),
                    session.peer(),
                    e
                ));
                failed.push(session.clone());
            }
        }

        let delivered = self.sessions.len() - failed.len();
        self.evict(&failed, logger).await;
        delivered
    }

    /// Deregister and close each of `failed`, then wake its handler.
    async fn evict(&mut self, failed: &[Arc<Session>], logger: &Logger) {
        for session in failed {
            if self.remove(session) {
                session.close().await;
                session.evicted.notify_one();
                logger.info(&format!("🚫 Dropped {} ({}) after a failed write", session.name(), session.peer()));
            }
        }
    }

    fn record(&mut self, message: &str) {
        self.history.append(message);
    }

    /// Send the history, oldest first, to `session` only. Returns the number
    /// of lines sent.
    async fn replay(&self, session: &Session) -> io::Result<usize> {
        for message in self.history.iter() {
            session.send_line(message).await?;
        }
        Ok(self.history.len())
    }
}

/// Process-wide chat state: the live sessions and the recent history,
/// behind a single mutex so add, remove, broadcast, append and replay never
/// interleave. Broadcast order is therefore a total order.
///
/// `add`, `broadcast`, `append` and `replay_to` take the lock for one step
/// each. The connection handler uses `join` and `publish`, which chain the
/// same steps under a single acquisition.
pub struct ChatState {
    members: Mutex<Members>,
    logger: Logger,
}

// A shared handle to the chat state, cloned into every connection task
pub type SharedState = Arc<ChatState>;

impl ChatState {
    pub fn new(history_capacity: usize, logger: Logger) -> Self {
        Self {
            members: Mutex::new(Members {
                sessions: Vec::new(),
                history: HistoryBuffer::new(history_capacity),
            }),
            logger,
        }
    }

    /// Register a session. No duplicate check.
    pub async fn add(&self, session: Arc<Session>) {
        self.members.lock().await.push(session);
    }

    /// Deregister `session`. Returns false when it was not registered.
    pub async fn remove(&self, session: &Arc<Session>) -> bool {
        self.members.lock().await.remove(session)
    }

    /// Send `message` to every registered session, returning how many it
    /// reached. Sessions that could not be written to are dropped and closed.
    pub async fn broadcast(&self, message: &str) -> usize {
        let mut members = self.members.lock().await;
        members.deliver(message, &self.logger).await
    }

    /// Record `message` in the history buffer.
    pub async fn append(&self, message: &str) {
        self.members.lock().await.record(message);
    }

    /// Send the current history, oldest first, to `session` only.
    pub async fn replay_to(&self, session: &Session) -> io::Result<()> {
        let members = self.members.lock().await;
        members.replay(session).await.map(|_| ())
    }

    /// Register `session`, announce it to everyone (itself included), then
    /// replay history to it. No broadcast can land between these steps, so
    /// the newcomer never sees a message both live and in the replay.
    pub async fn join(&self, session: Arc<Session>, announcement: &str) -> io::Result<()> {
        let mut members = self.members.lock().await;
        members.push(session.clone());
        members.deliver(announcement, &self.logger).await;

        if !members.sessions.iter().any(|s| Arc::ptr_eq(s, &session)) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "dropped while joining"));
        }

        match members.replay(&session).await {
            Ok(replayed) => {
                self.logger.debug(&format!("📜 Replayed {} messages to {}", replayed, session.name()));
                Ok(())
            }
            Err(e) => {
                members.evict(&[session], &self.logger).await;
                Err(e)
            }
        }
    }

    /// Broadcast a chat line and record it in the same critical section.
    pub async fn publish(&self, message: &str) -> usize {
        let mut members = self.members.lock().await;
        let delivered = members.deliver(message, &self.logger).await;
        members.record(message);
        delivered
    }

    pub async fn session_count(&self) -> usize {
        self.members.lock().await.sessions.len()
    }

    /// Snapshot of the history, oldest first.
    pub async fn history(&self) -> Vec<String> {
        self.members.lock().await.history.to_vec()
    }
}
