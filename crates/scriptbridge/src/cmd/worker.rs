use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scriptbridge_calc::CalcEngine;
use scriptbridge_session::{SessionError, WorkerConfig, WorkerListener};
use scriptbridge_wire::TypeRegistry;
use tracing::{debug, info, warn};

use crate::cmd::WorkerArgs;
use crate::exit::{session_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: WorkerArgs) -> CliResult<i32> {
    let config = if args.no_segments {
        WorkerConfig::default().with_segment_delimiter("")
    } else {
        WorkerConfig::default()
    };
    let listener = WorkerListener::bind_with_mode(&args.socket, args.mode, TypeRegistry::builtin())
        .map_err(|err| session_error("bind failed", err))?
        .with_worker_config(config);
    info!(path = %listener.path().display(), "worker listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        match listener.serve_one(CalcEngine::new()) {
            Ok(()) => debug!("session finished"),
            Err(SessionError::Transport(err)) => return Err(transport_error("accept failed", err)),
            Err(err) if args.once => return Err(session_error("session failed", err)),
            Err(err) if err.is_disconnect() => info!(error = %err, "controller went away"),
            Err(err) => warn!(error = %err, "session failed"),
        }
        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
