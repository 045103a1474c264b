use bills_portal_http::{Notice, NotificationPoller, PortalClient};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let portal = PortalClient::from_env().map_err(anyhow::Error::msg)?;

    let mut status = portal.resilience().subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            println!("connection status: {current:?} (banner: {})", current.shows_banner());
        }
    });

    if !portal.check_server_health().await && !portal.auto_reconnect().await {
        anyhow::bail!("portal is unreachable");
    }

    let data = portal.reload_basic_data().await?;
    println!(
        "{} companies, {} categories",
        data.companies.len(),
        data.categories.len()
    );

    let mut notices = portal.resilience().subscribe_notices();
    let poller = NotificationPoller::spawn(portal.clone());

    loop {
        let notice = match notices.recv().await {
            Ok(notice) => notice,
            Err(RecvError::Lagged(skipped)) => {
                println!("missed {skipped} notices");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match notice {
            Notice::UnreadNotifications { count, .. } => println!("{count} unread notifications"),
            Notice::SessionExpired { redirect_to } => {
                println!("session expired, sign in again at {redirect_to}");
                break;
            }
            other => println!("{other:?}"),
        }
    }

    poller.join().await;
    Ok(())
}
