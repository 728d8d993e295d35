//! `QuizArenaServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → gateway → registry
//! → engines. The store, question source, judge, and authenticator are
//! all injected — the server owns no global state beyond its registry.

use std::sync::Arc;

use quizarena_judge::JudgeClient;
use quizarena_protocol::JsonCodec;
use quizarena_room::RoomRegistry;
use quizarena_store::{QuestionSource, RoomStore};
use quizarena_transport::{Transport, WebSocketTransport};

use crate::auth::Authenticator;
use crate::gateway::{ServerState, handle_connection};
use crate::QuizArenaError;

/// Builder for configuring and starting a QuizArena server.
///
/// # Example
///
/// ```rust,ignore
/// let server = QuizArenaServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(store, source, judge, auth)
///     .await?;
/// server.run().await
/// ```
pub struct QuizArenaServerBuilder {
    bind_addr: String,
}

impl QuizArenaServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Binds the transport and assembles the server.
    pub async fn build<S, Q, J, A>(
        self,
        store: Arc<S>,
        source: Arc<Q>,
        judge: Arc<J>,
        auth: A,
    ) -> Result<QuizArenaServer<S, Q, J, A>, QuizArenaError>
    where
        S: RoomStore,
        Q: QuestionSource,
        J: JudgeClient,
        A: Authenticator,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let registry = RoomRegistry::new(Arc::clone(&store), source, judge);
        let state = Arc::new(ServerState {
            registry,
            store,
            auth,
            codec: JsonCodec,
        });
        Ok(QuizArenaServer { transport, state })
    }
}

impl Default for QuizArenaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running QuizArena server.
pub struct QuizArenaServer<S, Q, J, A> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, Q, J, A>>,
}

impl<S, Q, J, A> QuizArenaServer<S, Q, J, A>
where
    S: RoomStore,
    Q: QuestionSource,
    J: JudgeClient,
    A: Authenticator,
{
    pub fn builder() -> QuizArenaServerBuilder {
        QuizArenaServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(mut self) -> Result<(), QuizArenaError> {
        tracing::info!("QuizArena server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
