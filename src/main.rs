//! Runs one sync session for the configured identity and logs inbox changes.

use std::sync::Arc;

use tokio::sync::watch;

use inbox_sync::adapters::{RestApiConfig, RestNotificationApi, SocketIoConfig, SocketIoTransport};
use inbox_sync::application::{ApiFactory, PanelView, SessionDeps, SessionSettings, SessionSupervisor};
use inbox_sync::config::AppConfig;
use inbox_sync::domain::foundation::{Identity, Timestamp};
use inbox_sync::ports::NotificationApi;
use inbox_sync::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    telemetry::init_tracing(&config.telemetry);

    let identity = config.identity.identity()?;
    let signed_in = identity.is_some();
    if !signed_in {
        tracing::warn!("No identity configured; staying signed out");
    }

    let transport = SocketIoTransport::new(SocketIoConfig::new(config.push.url.clone()));
    let rest = RestApiConfig::new(config.api.base_url.clone()).with_timeout(config.api.timeout());
    let api_factory: ApiFactory = Arc::new(move |identity: &Identity| {
        let api = RestNotificationApi::new(rest.clone(), identity)?;
        Ok(Arc::new(api) as Arc<dyn NotificationApi>)
    });

    let (_identity_tx, identity_rx) = watch::channel(identity);
    let supervisor = SessionSupervisor::spawn(
        identity_rx,
        SessionDeps::new(Arc::new(transport), api_factory),
        SessionSettings::from_config(&config),
    );

    let session = if signed_in {
        let mut sessions = supervisor.subscribe();
        let current = sessions.wait_for(|s| s.is_some()).await?.clone();
        current
    } else {
        None
    };

    if let Some(session) = session {
        let _indicator = session.indicator().await;
        let panel = session.open_panel().await;
        let mut inbox = panel.subscribe();
        let mut connection = session.subscribe_connection();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,

                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *connection.borrow_and_update();
                    tracing::info!(state = %state, "Connection state");
                }

                changed = inbox.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = PanelView::render(&inbox.borrow_and_update(), &Timestamp::now());
                    tracing::info!(
                        unread = view.unread_count,
                        items = view.items.len(),
                        has_more = view.has_more,
                        "Inbox updated"
                    );
                    for item in view.items.iter().filter(|i| !i.is_read).take(5) {
                        tracing::info!(
                            id = %item.id,
                            icon = item.icon,
                            title = %item.title,
                            when = %item.time_ago,
                            "Unread"
                        );
                    }
                }
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    supervisor.shutdown().await;
    Ok(())
}
