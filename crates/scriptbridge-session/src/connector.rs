use std::path::Path;
use std::sync::Arc;

use scriptbridge_transport::{IpcStream, UnixDomainSocket};
use scriptbridge_wire::{TypeRegistry, WireConfig, WireStream};
use tracing::debug;

use crate::controller::Controller;
use crate::error::Result;
use crate::handshake::HandshakeConfig;

/// Connect to a listening worker and open a session as its controller.
pub fn connect(path: impl AsRef<Path>, registry: Arc<TypeRegistry>) -> Result<Controller<IpcStream>> {
    connect_with_config(
        path,
        registry,
        &HandshakeConfig::default(),
        WireConfig::default(),
    )
}

/// Connect with explicit configuration.
pub fn connect_with_config(
    path: impl AsRef<Path>,
    registry: Arc<TypeRegistry>,
    handshake_config: &HandshakeConfig,
    wire_config: WireConfig,
) -> Result<Controller<IpcStream>> {
    let path = path.as_ref();
    let stream = UnixDomainSocket::connect(path)?;
    debug!(path = %path.display(), "connected to worker");
    let wire = WireStream::with_config_ipc(stream, registry, wire_config)?;
    Controller::from_wire(wire, handshake_config)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use scriptbridge_wire::{TypeTag, Value};

    use super::*;
    use crate::error::SessionError;
    use crate::listener::WorkerListener;
    use crate::testing::TestEngine;

    fn make_sock_path(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sbc-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("worker.sock")
    }

    #[test]
    fn connect_runs_commands_against_listening_worker() {
        let sock_path = make_sock_path("run");
        let listener =
            WorkerListener::bind(&sock_path, TypeRegistry::builtin()).expect("listener should bind");

        let server = thread::spawn(move || {
            listener
                .serve_one(TestEngine::default())
                .expect("session should end cleanly");
        });

        let mut controller =
            connect(&sock_path, TypeRegistry::builtin()).expect("controller should connect");
        controller
            .set_value("x", &Value::Int(41))
            .expect("set should succeed");
        assert_eq!(
            controller
                .get_value("x", TypeTag::FLOAT32)
                .expect("get should succeed"),
            Value::Float(41.0)
        );
        controller.exit().expect("exit should be sent");

        server.join().expect("server thread should finish");
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn connect_without_listener_fails() {
        let sock_path = make_sock_path("missing");
        let err = connect(&sock_path, TypeRegistry::builtin())
            .err()
            .expect("connect should fail");
        assert!(matches!(err, SessionError::Transport(_)));
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
