use tracing::info;

use super::{ChangeKind, Subscription};

/// Log every change of a subscription's namespace until the store goes away
pub async fn log_changes(subscription: Subscription) {
    let namespace = subscription.namespace();
    while let Some(event) = subscription.next().await {
        let kind = match event.kind {
            ChangeKind::Added => "added",
            ChangeKind::Updated => "updated",
        };
        info!(
            %namespace,
            key = %event.key,
            kind,
            bytes = event.value.len(),
            "Store entry changed"
        );
    }
}
