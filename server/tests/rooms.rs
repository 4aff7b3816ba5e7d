use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::{channel, Receiver};
use tokio::sync::oneshot;

use server::admin::AdminCommand;
use server::connection::{ConnectionEvent, RoomCommand};
use server::registry::ConnectionId;
use server::room::RoomTx;
use server::rooms::Rooms;
use system::WsMessage;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "rooms-test-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

async fn join(room: &mut RoomTx, id: &str) -> (ConnectionId, Receiver<ConnectionEvent>) {
    let (tx, mut rx) = channel(64);
    room.send(RoomCommand::Connect {
        tx,
        session_id: id.to_owned(),
        resume: None,
    })
    .await
    .expect("room accepts connections");
    match rx.recv().await {
        Some(ConnectionEvent::Connected { connection_id, .. }) => (connection_id, rx),
        other => panic!("expected Connected, got {:?}", other),
    }
}

async fn say(room: &mut RoomTx, from: ConnectionId, message: WsMessage) {
    room.send(RoomCommand::Incoming { from, message })
        .await
        .expect("room accepts frames");
}

async fn settle(room: &mut RoomTx) {
    let (tx, rx) = oneshot::channel();
    room.send(RoomCommand::Admin(AdminCommand::Describe { tx }))
        .await
        .expect("room accepts describe");
    rx.await.expect("room replies to describe");
}

fn last_frame(rx: &mut Receiver<ConnectionEvent>) -> Option<WsMessage> {
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if let ConnectionEvent::Frame(message) = event {
            last = Some(message);
        }
    }
    last
}

async fn wait_until_gone(rooms: &Rooms, key: &str) {
    for _ in 0..200u32 {
        if rooms.get(key).is_none() {
            return;
        }
        tokio::time::delay_for(Duration::from_millis(5)).await;
    }
    panic!("room did not wind down in time");
}

#[tokio::test]
async fn it_does_not_spawn_rooms_for_observers() {
    let dir = scratch_dir("observer");
    let rooms = Rooms::new(dir.clone());

    assert!(rooms.get("lobby").is_none());
    let _tx = rooms.obtain("lobby").expect("room spawns");
    assert!(rooms.get("lobby").is_some());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn it_respawns_wound_down_rooms_on_the_same_database() {
    let dir = scratch_dir("respawn");
    let rooms = Rooms::new(dir.clone());

    let mut room = rooms.obtain("lobby").expect("room spawns");
    let (u1, _u1_rx) = join(&mut room, "u1").await;
    say(
        &mut room,
        u1,
        WsMessage::StartDrag {
            id: "u1".into(),
            image_id: "img-1".into(),
            image_url: "https://example.test/img-1.png".into(),
            x: 0.3,
            y: 0.3,
        },
    )
    .await;
    say(&mut room, u1, WsMessage::EndDrag { id: "u1".into() }).await;
    settle(&mut room).await;

    room.send(RoomCommand::Disconnect { from: u1 })
        .await
        .expect("room accepts disconnects");
    wait_until_gone(&rooms, "lobby").await;

    // Same key, fresh loop, old state on disk.
    let mut room = rooms.obtain("lobby").expect("room respawns");
    let (u2, mut u2_rx) = join(&mut room, "u2").await;
    say(&mut room, u2, WsMessage::GetImages).await;
    settle(&mut room).await;

    match last_frame(&mut u2_rx) {
        Some(WsMessage::GetImagesResponse { images }) => {
            assert_eq!(images.len(), 1);
            assert_eq!(images[0].id, "img-1");
            assert_eq!(images[0].x, 0.3);
        }
        other => panic!("expected get-images-response, got {:?}", other),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn it_reuses_the_live_room_for_the_same_key() {
    let dir = scratch_dir("reuse");
    let rooms = Rooms::new(dir.clone());

    let mut first = rooms.obtain("lobby").expect("room spawns");
    let mut second = rooms.obtain("lobby").expect("same room");
    let _a = join(&mut first, "u1").await;
    let _b = join(&mut second, "u2").await;

    let (tx, rx) = oneshot::channel();
    first
        .send(RoomCommand::Admin(AdminCommand::Describe { tx }))
        .await
        .expect("room accepts describe");
    let description = rx.await.expect("room replies to describe");
    assert_eq!(description.sessions, 2);
    assert_eq!(description.key, "lobby");

    let _ = std::fs::remove_dir_all(&dir);
}
