use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use scriptbridge_calc::CalcEngine;
use scriptbridge_session::{connect, Controller, Worker};
use scriptbridge_transport::IpcStream;
use scriptbridge_wire::TypeRegistry;
use tracing::debug;

use crate::cmd::RunArgs;
use crate::exit::{io_error, session_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_report, OutputFormat, PlotReport, RunReport};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = TypeRegistry::builtin();
    let report = match &args.socket {
        Some(path) => {
            let mut controller =
                connect(path, registry).map_err(|err| session_error("connect failed", err))?;
            drive(&mut controller, &args)?
        }
        None => run_in_process(&args, registry)?,
    };
    print_report(&report, format);
    Ok(SUCCESS)
}

/// Run against a worker on a thread of this process, joined by a socket pair.
fn run_in_process(args: &RunArgs, registry: Arc<TypeRegistry>) -> CliResult<RunReport> {
    let (controller_end, worker_end) =
        IpcStream::pair().map_err(|err| transport_error("socket pair failed", err))?;

    let worker_registry = Arc::clone(&registry);
    let handle = thread::Builder::new()
        .name("scriptbridge-worker".to_string())
        .spawn(move || -> scriptbridge_session::Result<()> {
            Worker::new(CalcEngine::new(), worker_end, worker_registry)?.run()
        })
        .map_err(|err| io_error("worker thread failed to start", err))?;

    let report = Controller::new(controller_end, registry)
        .map_err(|err| session_error("handshake failed", err))
        .and_then(|mut controller| drive(&mut controller, args));
    // The controller is gone by now, so the worker sees Exit or end of stream.

    match handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) if report.is_err() => debug!(error = %err, "worker stopped"),
        Ok(Err(err)) => return Err(session_error("worker failed", err)),
        Err(_) => return Err(CliError::new(INTERNAL, "worker thread panicked")),
    }
    report
}

fn drive<S: Read + Write>(controller: &mut Controller<S>, args: &RunArgs) -> CliResult<RunReport> {
    if args.plot.is_some() {
        controller
            .init_plot(args.width, args.height)
            .map_err(|err| session_error("plot setup failed", err))?;
    }

    let result_type = args.result.tag();
    let value = controller
        .run_script(&args.code, result_type)
        .map_err(|err| session_error("script failed", err))?;

    let console = if args.console {
        Some(
            controller
                .console_output()
                .map_err(|err| session_error("console output failed", err))?,
        )
    } else {
        None
    };

    let plot = match &args.plot {
        Some(path) => {
            let image = controller
                .plot()
                .map_err(|err| session_error("plot failed", err))?;
            std::fs::write(path, &image)
                .map_err(|err| io_error(&format!("writing {}", path.display()), err))?;
            Some(PlotReport {
                path: path.clone(),
                bytes: image.len(),
            })
        }
        None => None,
    };

    controller
        .exit()
        .map_err(|err| session_error("exit failed", err))?;

    Ok(RunReport {
        result_type,
        value,
        console,
        plot,
    })
}
