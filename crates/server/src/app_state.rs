use server_api::ApiContext;
use shared::protocol::ChangeEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<ChangeEvent>,
}
