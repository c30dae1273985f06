//! Frame intake and routing.
//!
//! Every frame read from the websocket, during the handshake or after it,
//! goes through [`Dispatcher::handle_event`]. Dispatch frames bump the
//! sequence and land in the event queue; control frames feed the pacemaker
//! or tell the supervisor to reconnect.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tether_proto::{Codec, Event, Frame, OpCode};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, trace, warn};

use crate::error::GatewayError;
use crate::gateway::ErrorLog;
use crate::identity::Identifier;
use crate::pacemaker::Pacemaker;
use crate::sequence::Sequence;
use crate::transport::{WsReceiver, WsSender};

/// What the caller should do after a frame was handled.
#[derive(Debug)]
pub(crate) enum Flow {
    Continue,
    Reconnect(GatewayError),
}

/// The live connection pieces a frame may need to touch.
pub(crate) struct Wire<'a> {
    pub(crate) sender: &'a WsSender,
    /// Absent until the handshake completes.
    pub(crate) pacemaker: Option<&'a Pacemaker>,
}

pub(crate) struct Dispatcher<C: Codec> {
    codec: C,
    identifier: Identifier,
    sequence: Sequence,
    events: mpsc::Sender<Event>,
    frame_tap: Option<mpsc::Sender<Frame>>,
    queue_timeout: Duration,
    error_log: ErrorLog,
}

impl<C: Codec> Dispatcher<C> {
    pub(crate) fn new(
        codec: C,
        identifier: Identifier,
        events: mpsc::Sender<Event>,
        frame_tap: Option<mpsc::Sender<Frame>>,
        queue_timeout: Duration,
        error_log: ErrorLog,
    ) -> Self {
        Self {
            codec,
            identifier,
            sequence: Sequence::new(),
            events,
            frame_tap,
            queue_timeout,
            error_log,
        }
    }

    pub(crate) const fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub(crate) const fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Read and decode the next frame, copying it to the tap if one is set.
    pub(crate) async fn next_frame(&self, receiver: &mut WsReceiver) -> Result<Frame, GatewayError> {
        let bytes = receiver.recv().await?;
        let frame = self.codec.decode_frame(&bytes)?;
        trace!(op = %frame.op, seq = ?frame.sequence, name = ?frame.event_name, "received frame");

        if let Some(tap) = &self.frame_tap {
            // Observers that fall behind lose frames rather than stall the reader.
            let _ = tap.try_send(frame.clone());
        }
        Ok(frame)
    }

    /// Check `frame` carries `expected` and decode its payload.
    pub(crate) fn assert_event<T: DeserializeOwned>(
        &self,
        frame: &Frame,
        expected: OpCode,
    ) -> Result<T, GatewayError> {
        if frame.op != expected {
            return Err(GatewayError::UnexpectedOpCode {
                expected,
                got: frame.op,
            });
        }
        Ok(self.codec.decode_payload(frame)?)
    }

    /// Encode and write one frame.
    pub(crate) async fn send<T: Serialize + ?Sized>(
        &self,
        sender: &WsSender,
        op: OpCode,
        payload: Option<&T>,
    ) -> Result<(), GatewayError> {
        let mut frame = Frame::new(op);
        if let Some(payload) = payload {
            frame = frame.with_data(self.codec.encode_payload(payload)?);
        }
        let bytes = self.codec.encode_frame(&frame)?;
        sender.send(bytes).await
    }

    /// Send a heartbeat carrying the last sequence, or null before any.
    pub(crate) async fn heartbeat(&self, sender: &WsSender) -> Result<(), GatewayError> {
        let seq = self.sequence.last();
        self.send(sender, OpCode::Heartbeat, Some(&seq)).await
    }

    /// Read frames until one satisfies `done`, handling each on the way.
    ///
    /// The matching frame is handled before returning, so side effects
    /// such as remembering the session from READY have happened.
    pub(crate) async fn wait_for_event<P>(
        &self,
        receiver: &mut WsReceiver,
        wire: &Wire<'_>,
        mut done: P,
    ) -> Result<(), GatewayError>
    where
        P: FnMut(&Frame) -> bool,
    {
        loop {
            let frame = self.next_frame(receiver).await?;
            let matched = done(&frame);

            if let Flow::Reconnect(err) = self.handle_event(frame, wire).await? {
                return Err(err);
            }
            if matched {
                return Ok(());
            }
        }
    }

    /// Route one received frame.
    pub(crate) async fn handle_event(&self, frame: Frame, wire: &Wire<'_>) -> Result<Flow, GatewayError> {
        match frame.op {
            OpCode::Dispatch => {
                self.dispatch(&frame).await?;
                Ok(Flow::Continue)
            }
            OpCode::HeartbeatAck => {
                if let Some(pacemaker) = wire.pacemaker {
                    pacemaker.echo();
                }
                Ok(Flow::Continue)
            }
            OpCode::Heartbeat => {
                debug!("gateway requested a heartbeat");
                self.heartbeat(wire.sender).await?;
                Ok(Flow::Continue)
            }
            OpCode::Reconnect => Ok(Flow::Reconnect(GatewayError::ReconnectRequested)),
            OpCode::InvalidSession => {
                self.identifier.clear_session();
                Ok(Flow::Reconnect(GatewayError::InvalidSession))
            }
            OpCode::Hello => {
                debug!("ignoring Hello outside the handshake");
                Ok(Flow::Continue)
            }
            op => {
                warn!(%op, "unknown event");
                Ok(Flow::Continue)
            }
        }
    }

    async fn dispatch(&self, frame: &Frame) -> Result<(), GatewayError> {
        if let Some(seq) = frame.sequence {
            self.sequence.observe(seq);
        }

        let event = Event::decode(&self.codec, frame)?;
        if let Event::Ready(ready) = &event {
            debug!(session_id = %ready.session_id, "session established");
            self.identifier.set_session_id(ready.session_id.clone());
        }

        // A full or abandoned queue drops the event but keeps the connection.
        match self.events.send_timeout(event, self.queue_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(event)) => {
                (self.error_log)(&GatewayError::QueueFull(event.name().to_string()));
            }
            Err(SendTimeoutError::Closed(event)) => {
                trace!(name = event.name(), "event receiver dropped");
                (self.error_log)(&GatewayError::QueueClosed);
            }
        }
        Ok(())
    }
}
