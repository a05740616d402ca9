#![cfg(all(unix, feature = "calc"))]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use scriptbridge::calc::CalcEngine;
use scriptbridge::session::{
    CallbackSignature, Controller, HandlerError, SessionError, Worker, WorkerConfig,
};
use scriptbridge::transport::IpcStream;
use scriptbridge::wire::{codec, Source, SelfDescribing, TypeRegistry, TypeTag, Value};

type WorkerHandle = JoinHandle<scriptbridge::session::Result<()>>;

fn start(registry: Arc<TypeRegistry>) -> (Controller<IpcStream>, WorkerHandle) {
    start_with(registry, WorkerConfig::default())
}

fn start_with(
    registry: Arc<TypeRegistry>,
    config: WorkerConfig,
) -> (Controller<IpcStream>, WorkerHandle) {
    let (controller_end, worker_end) = IpcStream::pair().expect("socket pair should open");
    let worker_registry = Arc::clone(&registry);
    let handle = thread::spawn(move || {
        Worker::new(CalcEngine::new(), worker_end, worker_registry)?
            .with_config(config)
            .run()
    });
    let controller = Controller::new(controller_end, registry).expect("handshake should succeed");
    (controller, handle)
}

fn finish(mut controller: Controller<IpcStream>, handle: WorkerHandle) {
    controller.exit().expect("exit should be sent");
    drop(controller);
    handle
        .join()
        .expect("worker thread should not panic")
        .expect("worker should stop cleanly");
}

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl SelfDescribing for Point {
    const TYPE_TAG: TypeTag = TypeTag(100);

    fn encode(&self, dst: &mut BytesMut) -> scriptbridge::wire::Result<()> {
        codec::put_i32(dst, self.x);
        codec::put_i32(dst, self.y);
        Ok(())
    }

    fn decode(src: &mut Source<'_>) -> scriptbridge::wire::Result<Self> {
        Ok(Self {
            x: src.read_i32()?,
            y: src.read_i32()?,
        })
    }
}

#[test]
fn values_round_trip_through_worker_variables() {
    let (mut controller, handle) = start(TypeRegistry::builtin());

    controller.set("n", 3).expect("set should succeed");
    controller
        .set("xs", vec![1.5f32, 2.5])
        .expect("set should succeed");
    controller
        .set("label", "points".to_string())
        .expect("set should succeed");

    assert_eq!(controller.get::<i32>("n").expect("get n"), 3);
    assert_eq!(
        controller
            .get_value("n", TypeTag::FLOAT32_VEC)
            .expect("int widens to float vector"),
        Value::FloatVec(vec![3.0])
    );
    assert_eq!(
        controller.run::<Vec<f32>>("xs * n").expect("run should succeed"),
        vec![4.5, 7.5]
    );
    assert_eq!(
        controller
            .run::<String>("paste(label, length(xs))")
            .expect("run should succeed"),
        "points 2"
    );

    finish(controller, handle);
}

#[test]
fn script_errors_leave_session_usable() {
    let (mut controller, handle) = start(TypeRegistry::builtin());

    let err = controller.run_void("stop('nope')").unwrap_err();
    assert!(matches!(err, SessionError::Remote(ref msg) if msg.contains("nope")));
    assert!(err.is_recoverable());
    assert!(controller.is_ready());

    let err = controller.get::<i32>("missing").unwrap_err();
    assert!(matches!(err, SessionError::Remote(ref msg) if msg.contains("missing")));

    let err = controller.run::<i32>("'text'").unwrap_err();
    assert!(matches!(err, SessionError::Remote(_)));

    assert_eq!(controller.run::<i32>("40 + 2").expect("run should succeed"), 42);
    finish(controller, handle);
}

#[test]
fn unregistered_tag_is_refused_before_sending() {
    let (mut controller, handle) = start(TypeRegistry::builtin());

    let err = controller.run_script("1", TypeTag(55)).unwrap_err();
    assert!(matches!(err, SessionError::InvalidValue(_)));
    assert!(controller.is_ready());

    let err = controller.get_value("x", TypeTag::VOID).unwrap_err();
    assert!(matches!(err, SessionError::InvalidValue(_)));

    assert_eq!(controller.run::<i32>("7").expect("run should succeed"), 7);
    finish(controller, handle);
}

#[test]
fn scripts_call_back_into_controller() {
    let (mut controller, handle) = start(TypeRegistry::builtin());

    controller
        .set_callback(
            "twice",
            CallbackSignature::new(TypeTag::INT32, vec![TypeTag::INT32]),
            |args: Vec<Value>| -> Result<Value, HandlerError> {
                match args.as_slice() {
                    [Value::Int(v)] => Ok(Value::Int(v * 2)),
                    other => Err(format!("unexpected arguments {other:?}").into()),
                }
            },
        )
        .expect("callback should install");
    assert_eq!(controller.callback_count(), 1);

    assert_eq!(
        controller.run::<i32>("twice(21) + 1").expect("run should succeed"),
        43
    );
    assert_eq!(
        controller
            .run::<i32>("twice(twice(2))")
            .expect("nested calls should succeed"),
        8
    );

    finish(controller, handle);
}

#[test]
fn callbacks_run_in_script_order() {
    let (mut controller, handle) = start(TypeRegistry::builtin());
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&seen);
    controller
        .set_callback(
            "note",
            CallbackSignature::new(TypeTag::VOID, vec![TypeTag::STRING]),
            move |args: Vec<Value>| -> Result<Value, HandlerError> {
                if let [Value::Str(s)] = args.as_slice() {
                    log.borrow_mut().push(s.clone());
                }
                Ok(Value::Void)
            },
        )
        .expect("callback should install");

    controller
        .run_void("note('a'); note('b')\nnote(paste('c', 1))")
        .expect("run should succeed");
    assert_eq!(*seen.borrow(), vec!["a", "b", "c 1"]);

    finish(controller, handle);
}

#[test]
fn failing_handler_ends_the_session() {
    let (mut controller, handle) = start(TypeRegistry::builtin());

    controller
        .set_callback(
            "boom",
            CallbackSignature::new(TypeTag::VOID, Vec::new()),
            |_| Err("handler exploded".into()),
        )
        .expect("callback should install");

    let err = controller.run_void("boom()").unwrap_err();
    assert!(matches!(
        err,
        SessionError::CallbackFailed { ref message, .. } if message == "handler exploded"
    ));
    assert!(controller.is_poisoned());

    let err = controller.run_void("1").unwrap_err();
    assert!(matches!(err, SessionError::Contract(_)));

    drop(controller);
    let result = handle.join().expect("worker thread should not panic");
    assert!(result.is_err());
}

#[test]
fn console_and_plot_are_collected() {
    let (mut controller, handle) = start(TypeRegistry::builtin());

    controller.init_plot(32, 24).expect("capture should start");
    controller
        .run_void("print(c(1, 2))\nplot(c(1, 3, 2))")
        .expect("run should succeed");

    assert_eq!(
        controller.console_output().expect("console should drain"),
        "1 2\n"
    );
    assert_eq!(controller.console_output().expect("console should drain"), "");

    let image = controller.plot().expect("plot should render");
    assert!(image.starts_with(b"P6\n32 24\n255\n"));
    assert_eq!(image.len(), "P6\n32 24\n255\n".len() + 32 * 24 * 3);

    let err = controller.plot().unwrap_err();
    assert!(matches!(err, SessionError::Remote(_)));

    finish(controller, handle);
}

#[test]
fn result_comes_from_last_segment() {
    let (mut controller, handle) = start(TypeRegistry::builtin());

    assert_eq!(
        controller
            .run::<i32>("a <- 2\n\nb <- a * 5\n\nb + 1")
            .expect("run should succeed"),
        11
    );
    finish(controller, handle);

    let (mut controller, handle) = start_with(
        TypeRegistry::builtin(),
        WorkerConfig::default().with_segment_delimiter(""),
    );
    assert_eq!(
        controller
            .run::<i32>("a <- 2\n\na * 4")
            .expect("run should succeed"),
        8
    );
    finish(controller, handle);
}

#[test]
fn custom_values_pass_through_untouched() {
    let registry = Arc::new(
        TypeRegistry::builder()
            .register_self_describing::<Point>()
            .expect("point should register")
            .build(),
    );
    let (mut controller, handle) = start(registry);

    controller
        .set_value("p", &Value::custom(Point { x: 3, y: -4 }))
        .expect("set should succeed");
    let value = controller
        .run_script("q <- p\nq", Point::TYPE_TAG)
        .expect("run should succeed");
    assert_eq!(value.downcast_ref::<Point>(), Some(&Point { x: 3, y: -4 }));

    let err = controller.run::<i32>("p").unwrap_err();
    assert!(matches!(err, SessionError::Remote(_)));

    finish(controller, handle);
}
