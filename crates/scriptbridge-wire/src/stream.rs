use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use bytes::BytesMut;
use scriptbridge_transport::IpcStream;
use tracing::trace;

use crate::codec::{self, Source};
use crate::config::WireConfig;
use crate::error::{Result, WireError};
use crate::registry::TypeRegistry;
use crate::tags::{Command, ReplyKind};
use crate::value::{TypeTag, Value};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// One side's view of the byte channel.
///
/// Reads go straight to the channel and block until the full encoding has
/// arrived. Writes are staged in an outgoing buffer and only reach the
/// channel on [`flush`](Self::flush), so a message that fails to encode
/// halfway can be [`discard`](Self::discard)ed without corrupting the stream.
pub struct WireStream<S> {
    inner: S,
    out: BytesMut,
    config: WireConfig,
    registry: Arc<TypeRegistry>,
}

impl<S: Read + Write> WireStream<S> {
    /// Wrap a connected channel with default limits.
    pub fn new(inner: S, registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(inner, registry, WireConfig::default())
    }

    pub fn with_config(inner: S, registry: Arc<TypeRegistry>, config: WireConfig) -> Self {
        Self {
            inner,
            out: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    fn source(&mut self) -> Source<'_> {
        Source::new(&mut self.inner, &self.config)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.source().read_u8()
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.source().read_i32()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.source().read_u32()
    }

    pub fn read_usize(&mut self) -> Result<usize> {
        self.source().read_usize()
    }

    pub fn read_type_tag(&mut self) -> Result<TypeTag> {
        self.source().read_type_tag()
    }

    /// Read a count prefix bounded by the configured sequence limit.
    pub fn read_count(&mut self) -> Result<usize> {
        let max = self.config.max_sequence_len;
        self.source().read_len(max)
    }

    pub fn read_string(&mut self) -> Result<String> {
        self.source().read_string()
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        self.source().read_bytes()
    }

    pub fn read_command(&mut self) -> Result<Command> {
        let byte = self.read_u8()?;
        let command = Command::try_from(byte)?;
        trace!(%command, "read command tag");
        Ok(command)
    }

    pub fn read_reply_kind(&mut self) -> Result<ReplyKind> {
        let byte = self.read_u8()?;
        let kind = ReplyKind::try_from(byte)?;
        trace!(%kind, "read reply tag");
        Ok(kind)
    }

    /// Read a tagged value.
    pub fn read_value(&mut self) -> Result<Value> {
        let registry = Arc::clone(&self.registry);
        registry.decode(&mut self.source())
    }

    /// Read a tagged value and require it to have type `tag`.
    pub fn read_value_of(&mut self, tag: TypeTag) -> Result<Value> {
        let found = self.read_type_tag()?;
        if found != tag {
            return Err(WireError::TypeMismatch {
                expected: tag,
                found,
            });
        }
        let registry = Arc::clone(&self.registry);
        registry.decode_body(tag, &mut self.source())
    }

    pub fn put_u8(&mut self, v: u8) {
        codec::put_u8(&mut self.out, v);
    }

    pub fn put_i32(&mut self, v: i32) {
        codec::put_i32(&mut self.out, v);
    }

    pub fn put_u32(&mut self, v: u32) {
        codec::put_u32(&mut self.out, v);
    }

    pub fn put_usize(&mut self, v: usize) {
        codec::put_usize(&mut self.out, v);
    }

    pub fn put_type_tag(&mut self, tag: TypeTag) {
        codec::put_type_tag(&mut self.out, tag);
    }

    pub fn put_str(&mut self, s: &str) {
        codec::put_str(&mut self.out, s);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        codec::put_bytes(&mut self.out, bytes);
    }

    pub fn put_command(&mut self, command: Command) {
        self.put_u8(command.as_u8());
    }

    pub fn put_reply_kind(&mut self, kind: ReplyKind) {
        self.put_u8(kind.as_u8());
    }

    /// Stage a tagged value.
    ///
    /// On failure the outgoing buffer is left as it was before the call.
    pub fn put_value(&mut self, value: &Value) -> Result<()> {
        let mark = self.out.len();
        let result = self.registry.encode(value, &mut self.out);
        if result.is_err() {
            self.out.truncate(mark);
        }
        result
    }

    /// Stage `value` as type `tag`.
    pub fn put_value_as(&mut self, tag: TypeTag, value: &Value) -> Result<()> {
        value.expect_type(tag)?;
        self.put_value(value)
    }

    /// Number of staged bytes not yet written to the channel.
    pub fn pending(&self) -> usize {
        self.out.len()
    }

    /// Drop everything staged since the last flush.
    pub fn discard(&mut self) {
        self.out.clear();
    }

    /// Write all staged bytes to the channel (blocking).
    pub fn flush(&mut self) -> Result<()> {
        let mut offset = 0usize;
        let result = loop {
            if offset == self.out.len() {
                break Ok(());
            }
            match self.inner.write(&self.out[offset..]) {
                Ok(0) => break Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(WireError::Io(err)),
            }
        };
        trace!(bytes = offset, "flushed wire buffer");
        self.out.clear();
        result?;

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying channel.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the stream and return the channel. Staged bytes are dropped.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl WireStream<IpcStream> {
    /// Wrap an `IpcStream` and apply the configured timeouts to it.
    pub fn with_config_ipc(
        inner: IpcStream,
        registry: Arc<TypeRegistry>,
        config: WireConfig,
    ) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(|err| WireError::Io(err.into_io()))?;
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(|err| WireError::Io(err.into_io()))?;
        Ok(Self::with_config(inner, registry, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use super::*;

    fn loopback() -> (WireStream<UnixStream>, WireStream<UnixStream>) {
        let (left, right) = UnixStream::pair().unwrap();
        (
            WireStream::new(left, TypeRegistry::builtin()),
            WireStream::new(right, TypeRegistry::builtin()),
        )
    }

    #[test]
    fn nothing_reaches_channel_before_flush() {
        let mut stream = WireStream::new(Cursor::new(Vec::new()), TypeRegistry::builtin());
        stream.put_command(Command::RunScript);
        stream.put_str("x <- 1");
        assert!(stream.pending() > 0);
        assert!(stream.get_ref().get_ref().is_empty());

        stream.flush().unwrap();
        assert_eq!(stream.pending(), 0);
        assert_eq!(stream.get_ref().get_ref()[0], Command::RunScript.as_u8());
    }

    #[test]
    fn discard_drops_staged_bytes() {
        let mut stream = WireStream::new(Cursor::new(Vec::new()), TypeRegistry::builtin());
        stream.put_reply_kind(ReplyKind::Value);
        stream.discard();
        stream.flush().unwrap();
        assert!(stream.get_ref().get_ref().is_empty());
    }

    #[test]
    fn failed_value_encode_leaves_buffer_unchanged() {
        let mut stream = WireStream::new(Cursor::new(Vec::new()), TypeRegistry::builtin());
        stream.put_reply_kind(ReplyKind::Value);
        let before = stream.pending();
        let err = stream
            .put_value_as(TypeTag::STRING, &Value::Int(1))
            .unwrap_err();
        assert!(matches!(err, WireError::TypeMismatch { .. }));
        assert_eq!(stream.pending(), before);
    }

    #[test]
    fn tags_and_values_cross_the_channel() {
        let (mut controller, mut worker) = loopback();

        controller.put_command(Command::SetValue);
        controller.put_str("xs");
        controller
            .put_value(&Value::FloatVec(vec![0.5, -1.0]))
            .unwrap();
        controller.flush().unwrap();

        assert_eq!(worker.read_command().unwrap(), Command::SetValue);
        assert_eq!(worker.read_string().unwrap(), "xs");
        assert_eq!(
            worker.read_value().unwrap(),
            Value::FloatVec(vec![0.5, -1.0])
        );

        worker.put_reply_kind(ReplyKind::Value);
        worker.put_value(&Value::Int(4)).unwrap();
        worker.flush().unwrap();

        assert_eq!(controller.read_reply_kind().unwrap(), ReplyKind::Value);
        assert_eq!(
            controller.read_value_of(TypeTag::INT32).unwrap(),
            Value::Int(4)
        );
    }

    #[test]
    fn read_value_of_rejects_other_tag() {
        let (mut a, mut b) = loopback();
        a.put_value(&Value::Str("four".into())).unwrap();
        a.flush().unwrap();
        assert!(matches!(
            b.read_value_of(TypeTag::INT32),
            Err(WireError::TypeMismatch {
                expected: TypeTag::INT32,
                found: TypeTag::STRING
            })
        ));
    }

    #[test]
    fn unknown_tags_are_errors() {
        let (mut a, mut b) = loopback();
        a.put_u8(0xEE);
        a.put_u8(0xEE);
        a.flush().unwrap();
        assert!(matches!(
            b.read_command(),
            Err(WireError::UnknownCommand(0xEE))
        ));
        assert!(matches!(
            b.read_reply_kind(),
            Err(WireError::UnknownReply(0xEE))
        ));
    }

    #[test]
    fn peer_drop_is_connection_closed() {
        let (a, mut b) = loopback();
        drop(a);
        let err = b.read_command().unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn write_to_dropped_peer_fails() {
        let (mut a, b) = loopback();
        drop(b);
        a.put_bytes(&[0u8; 1024]);
        let err = a.flush().unwrap_err();
        assert!(err.is_disconnect(), "unexpected error: {err}");
        assert_eq!(a.pending(), 0);
    }

    #[test]
    fn ipc_stream_timeouts_applied() {
        let (left, _right) = IpcStream::pair().unwrap();
        let config = WireConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..WireConfig::default()
        };
        let mut stream =
            WireStream::with_config_ipc(left, TypeRegistry::builtin(), config).unwrap();
        let err = stream.read_u8().unwrap_err();
        assert!(matches!(err, WireError::Io(ref io)
            if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)));
    }
}
