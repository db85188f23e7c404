//! The alder monitor pipeline.
//!
//! Bridges backing-store watch events to per-client OVSDB update
//! notifications. The pieces, leaves first:
//!
//! - [`codec`]: decode stored row payloads, split off `_uuid`, project
//!   selected columns.
//! - [`diff`]: per-column deltas honoring scalar/set/map semantics.
//! - [`Updater`]: one per `(client, table, condition)`; turns a single KV
//!   event into an OVSDB `RowUpdate` under v1/v2/v3 rules.
//! - [`UpdaterRegistry`]: table key to active updaters, the routing index.
//! - [`DbWatcher`]: one loop per database; revision-dedups batches, routes
//!   events through the registry, hands grouped updates to a
//!   [`NotificationSink`].
//! - [`ClientNotifier`]: per-client task that serializes outgoing
//!   notifications on a bounded channel and dispatches them by protocol
//!   variant over a [`NotificationTransport`].
//!
//! The watch loop never touches the client transport directly; all transport
//! I/O happens in the notifiers, so one slow client cannot stall a database.

pub mod codec;
pub mod diff;

mod error;
mod notifier;
mod registry;
mod updater;
mod watch;

pub use error::MonitorError;
pub use notifier::ClientNotifier;
pub use notifier::NOTIFICATION_CHANNEL_SIZE;
pub use notifier::NOTIFIER_GRACE_DELAY;
pub use notifier::NotificationTransport;
pub use registry::UpdaterRegistry;
pub use updater::Updater;
pub use watch::DbWatcher;
pub use watch::NotificationSink;
pub use watch::RevisionChecker;
