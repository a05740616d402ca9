use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use scriptbridge_transport::{IpcStream, UnixDomainSocket};
use scriptbridge_wire::{TypeRegistry, WireConfig, WireStream};
use tracing::{debug, info};

use crate::engine::ScriptEngine;
use crate::error::Result;
use crate::handshake::HandshakeConfig;
use crate::worker::{Worker, WorkerConfig};

/// Listens on a Unix socket and turns each accepted connection into a worker session.
pub struct WorkerListener {
    socket: UnixDomainSocket,
    registry: Arc<TypeRegistry>,
    handshake_config: HandshakeConfig,
    wire_config: WireConfig,
    worker_config: WorkerConfig,
    next_session_id: AtomicU64,
}

impl WorkerListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>, registry: Arc<TypeRegistry>) -> Result<Self> {
        Ok(Self::from_socket(UnixDomainSocket::bind(path)?, registry))
    }

    /// Bind with explicit socket file permissions.
    pub fn bind_with_mode(
        path: impl AsRef<Path>,
        mode: u32,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        Ok(Self::from_socket(
            UnixDomainSocket::bind_with_mode(path, mode)?,
            registry,
        ))
    }

    fn from_socket(socket: UnixDomainSocket, registry: Arc<TypeRegistry>) -> Self {
        Self {
            socket,
            registry,
            handshake_config: HandshakeConfig::default(),
            wire_config: WireConfig::default(),
            worker_config: WorkerConfig::default(),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake_config = config;
        self
    }

    pub fn with_wire_config(mut self, config: WireConfig) -> Self {
        self.wire_config = config;
        self
    }

    pub fn with_worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    /// Accept the next connection and complete the handshake.
    ///
    /// The handshake read is bounded by the handshake timeout; afterwards the
    /// wire timeouts apply.
    pub fn accept<E: ScriptEngine>(&self, engine: E) -> Result<Worker<E, IpcStream>> {
        let stream = self.socket.accept()?;
        let session = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        match stream.peer_credentials() {
            Some((uid, gid, pid)) => info!(session, uid, gid, pid, "controller connected"),
            None => info!(session, "controller connected"),
        }

        let control = stream.try_clone()?;
        control.set_read_timeout(self.handshake_config.timeout)?;
        control.set_write_timeout(self.wire_config.write_timeout)?;

        let wire = WireStream::with_config(
            stream,
            Arc::clone(&self.registry),
            self.wire_config.clone(),
        );
        let worker = Worker::from_wire(
            engine,
            wire,
            &self.handshake_config,
            self.worker_config.clone(),
        )?;
        control.set_read_timeout(self.wire_config.read_timeout)?;
        debug!(session, "handshake complete");
        Ok(worker)
    }

    /// Accept one connection and serve it until the controller exits.
    pub fn serve_one<E: ScriptEngine>(&self, engine: E) -> Result<()> {
        self.accept(engine)?.run()
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}
