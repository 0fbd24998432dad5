use interview_room::{join_room, logger, RoomConfig, SessionNotice, SyntheticCapture};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("interview-room: {e}");
        std::process::exit(1);
    }
}

async fn run() -> interview_room::Result<()> {
    let path = std::env::args().nth(1).ok_or_else(|| {
        interview_room::RoomError::Config("usage: interview-room <config.json>".into())
    })?;
    let config = RoomConfig::load(&path)?;
    logger::init(config.logging.level_filter());
    log::info!(
        "joining room {} via {} as {}",
        config.room_id,
        config.hub_url,
        config.display_name.as_deref().unwrap_or("anonymous")
    );

    let mut client = join_room(&config, Arc::new(SyntheticCapture))?;
    let handle = client.handle.clone();
    tokio::spawn(async move {
        if let Err(e) = handle.enable_camera().await {
            log::warn!("camera unavailable: {e}");
        }
        if let Err(e) = handle.enable_mic().await {
            log::warn!("microphone unavailable: {e}");
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, leaving room");
                break;
            }
            notice = client.notices.recv() => match notice {
                Some(SessionNotice::Left) | None => break,
                Some(notice) => log::info!("{notice:?}"),
            },
        }
    }

    client.shutdown(Duration::from_secs(2)).await;
    Ok(())
}
