use actix_web::error;
use actix_web::web::{self, HttpRequest, HttpResponse};
use actix_web::Responder;
use actix_web::Result;
use system::serde_json::json;

use crate::admin::AdminCommand;
use crate::connection::RoomCommand;
use crate::rooms::Rooms;

pub fn configure_admin_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(web::resource("/rooms/{room}").route(web::get().to(show_room)))
            .service(
                web::resource("/rooms/{room}/close-sessions")
                    .route(web::post().to(close_sessions)),
            ),
    );
}

async fn show_room(req: HttpRequest, rooms: web::Data<Rooms>) -> Result<impl Responder> {
    let key = req.match_info().get("room").unwrap_or_default();

    let room_tx = match rooms.get(key) {
        Some(room_tx) => room_tx,
        None => {
            return Ok(HttpResponse::NotFound().json(json!({ "error": "room is not live" })))
        }
    };

    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut room_tx = room_tx;
    room_tx
        .send(RoomCommand::Admin(AdminCommand::Describe { tx }))
        .await
        .map_err(|_| error::ErrorInternalServerError("Internal Server Error"))?;
    let description = rx
        .await
        .map_err(|_| error::ErrorInternalServerError("Receiver await error"))?;

    Ok(HttpResponse::Ok().json(description))
}

/// Force-closes every connection in the room. Hitting a room that is not
/// live (or that winds down mid-request) is not an error; there is just
/// nothing to close.
async fn close_sessions(req: HttpRequest, rooms: web::Data<Rooms>) -> Result<impl Responder> {
    let key = req.match_info().get("room").unwrap_or_default();

    let closed = match rooms.get(key) {
        Some(mut room_tx) => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            match room_tx
                .send(RoomCommand::Admin(AdminCommand::CloseSessions { tx }))
                .await
            {
                Ok(()) => rx.await.unwrap_or(0),
                Err(_) => {
                    log::info!("room {} wound down mid-request, nothing to close", key);
                    0
                }
            }
        }
        None => {
            log::info!("room {} is not live, nothing to close", key);
            0
        }
    };

    Ok(HttpResponse::Ok().json(json!({ "room": key, "closed": closed })))
}
