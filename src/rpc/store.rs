use std::path::Path;

use tokio_core::reactor::Handle;
use tokio_uds::UnixStream;

use common::comm::{create_protocol_stream, Connection};
use errors::{Result, ResultExt};
use scheduler::state::StateRef;
use super::messages::StoreNotification;

/// Subscribe to the local object store's availability stream. The
/// availability index is rebuilt purely from these notifications, so
/// this connection is mandatory; failing to establish it is a startup
/// error.
pub fn subscribe_to_store(state: &StateRef, socket_path: &Path, handle: &Handle) -> Result<()> {
    let stream = UnixStream::connect(socket_path, handle)
        .chain_err(|| format!("cannot connect to object store at {:?}", socket_path))?;
    info!("subscribed to object store at {:?}", socket_path);

    let connection = Connection::from(create_protocol_stream(stream));
    let on_message = {
        let state = state.clone();
        move |frame: ::bytes::BytesMut| {
            let notification: StoreNotification = ::serde_cbor::from_slice(&frame)?;
            match notification {
                StoreNotification::Added(object_id) => {
                    state.get_mut().handle_object_available(object_id)
                }
                StoreNotification::Removed(object_id) => {
                    state.get_mut().handle_object_removed(object_id)
                }
            }
            Ok(())
        }
    };
    connection.start(handle, on_message, |error| match error {
        // Losing the store means flying blind on availability; keep
        // running, the store restarts independently.
        Some(error) => error!("object store connection failed: {}", error),
        None => warn!("object store closed the notification stream"),
    });
    Ok(())
}
