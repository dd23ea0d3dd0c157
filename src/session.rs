//! Per-client WebSocket session actor.
//!
//! Each connected socket gets one `WsSession`, identified by a freshly
//! minted `ClientId`. The session itself holds no game state — it only
//! parses inbound JSON into a `ClientMessage` and forwards it to the `Hub`,
//! and pushes whatever JSON the `Hub` decides to `Deliver` back out over
//! the socket. All authority lives in the `Hub`'s single mailbox.

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};

use crate::hub::{Connect, Disconnect, Hub, Inbound};
use crate::lobby::ClientId;
use crate::protocol::ClientMessage;

/// Interval between server-initiated pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// A session with no pong (or other traffic) within this long is considered
/// dead and closed.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// A JSON payload the `Hub` wants written to this session's socket verbatim.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Deliver(pub serde_json::Value);

pub struct WsSession {
    id: ClientId,
    last_heartbeat: Instant,
    hub: Addr<Hub>,
}

impl WsSession {
    pub fn new(hub: Addr<Hub>) -> Self {
        Self {
            id: ClientId::new_v4(),
            last_heartbeat: Instant::now(),
            hub,
        }
    }

    /// Starts a periodic heartbeat check. If the client has not responded
    /// to a ping within `CLIENT_TIMEOUT`, the connection is closed.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                log::warn!("WS session {} heartbeat timeout, disconnecting", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                let err = crate::protocol::error_message(format!("invalid message: {e}"));
                ctx.text(err.to_string());
                return;
            }
        };
        self.hub.do_send(Inbound { client_id: self.id, message });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("WS session {} started", self.id);
        self.start_heartbeat(ctx);
        self.hub.do_send(Connect { client_id: self.id, addr: ctx.address().recipient() });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("WS session {} stopped", self.id);
        self.hub.do_send(Disconnect { client_id: self.id });
    }
}

impl actix::StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(_)) => {
                log::warn!("WS session {}: binary messages not supported", self.id);
                ctx.text(crate::protocol::error_message("binary messages are not supported").to_string());
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                log::info!("WS session {} closed: {:?}", self.id, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {}
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                log::error!("WS session {} protocol error: {}", self.id, e);
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        ctx.text(msg.0.to_string());
    }
}

/// Upgrades an HTTP request to a WebSocket connection bound to the `Hub`.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Addr<Hub>>,
) -> Result<HttpResponse, actix_web::Error> {
    let session = WsSession::new(hub.get_ref().clone());
    log::info!("new WebSocket connection request from {:?}", req.peer_addr());
    ws::start(session, &req, stream)
}
