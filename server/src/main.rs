use std::path::PathBuf;

use actix_cors::Cors;
use actix_web::{App, HttpServer};

use server::handlers;
use server::rooms::Rooms;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let bind_addr =
        std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_owned());

    let rooms = Rooms::new(PathBuf::from(data_dir));

    log::info!("listening on {}", bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .data(rooms.clone())
            .configure(handlers::root)
    })
    .bind(bind_addr)?
    .run()
    .await
}
