//! Discovery of existing loopback routes for an ALSA card.
//!
//! The listing driver and every per-stream verification hold an `Rc` to the
//! same [`FindLoopback`] request. The request reports its matches from `Drop`,
//! so the completion runs exactly once, after the end of the listing and after
//! the last verification, in whichever order those happen.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tokio::sync::oneshot;

use super::LOOPBACK_MODULE;
use super::connection::Connection;
use super::direction::Direction;
use super::props::matches_alsa_card;
use super::server::{Listing, StreamRecord};

type FindLoopbackCallback = Box<dyn FnOnce(String, Direction, Vec<u32>)>;

struct FindLoopback {
    card_name: String,
    direction: Direction,
    modules: RefCell<Vec<u32>>,
    aborted: Cell<bool>,
    callback: Option<FindLoopbackCallback>,
}

impl FindLoopback {
    fn add_module(&self, index: u32) {
        let mut modules = self.modules.borrow_mut();
        if !modules.contains(&index) {
            modules.push(index);
        }
    }

    /// The completion will not run once the request is aborted.
    fn abort(&self) {
        self.aborted.set(true);
    }
}

impl Drop for FindLoopback {
    fn drop(&mut self) {
        if self.aborted.get() {
            log::debug!(
                "Abandoned loopback search for ALSA card '{}' {}",
                self.card_name,
                self.direction.stream_kind()
            );
            return;
        }
        if let Some(callback) = self.callback.take() {
            callback(
                std::mem::take(&mut self.card_name),
                self.direction,
                self.modules.take(),
            );
        }
    }
}

/// Checks whether one stream's owner module is a loopback on our card.
struct VerifyLoopback {
    request: Rc<FindLoopback>,
    module_index: u32,
}

impl VerifyLoopback {
    async fn run(self, connection: Connection, stream: StreamRecord) {
        let request = &self.request;
        let kind = request.direction.stream_kind().device_kind();

        let device = match connection.server().device_by_index(kind, stream.device).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                log::warn!(
                    "Couldn't find {} {} for {} {} while finding ALSA card '{}'",
                    kind,
                    stream.device,
                    request.direction.stream_kind(),
                    stream.index,
                    request.card_name
                );
                return;
            }
            Err(e) => {
                log::warn!(
                    "Couldn't get {} {} for {} {}: {:#}",
                    kind,
                    stream.device,
                    request.direction.stream_kind(),
                    stream.index,
                    e
                );
                return;
            }
        };

        if !matches_alsa_card(&device.properties, &request.card_name) {
            log::debug!(
                "{} {} '{}' is not ALSA card '{}'",
                kind,
                device.index,
                device.name,
                request.card_name
            );
            return;
        }

        log::debug!(
            "Checking whether module {} for ALSA card '{}' {} is a loopback module",
            self.module_index,
            request.card_name,
            request.direction.stream_kind()
        );

        let module = match connection.server().module_by_index(self.module_index).await {
            Ok(Some(module)) => module,
            Ok(None) => {
                log::warn!(
                    "Could not get module {} for ALSA card '{}' {}",
                    self.module_index,
                    request.card_name,
                    request.direction.stream_kind()
                );
                return;
            }
            Err(e) => {
                log::warn!(
                    "Could not get module {} for ALSA card '{}' {}: {:#}",
                    self.module_index,
                    request.card_name,
                    request.direction.stream_kind(),
                    e
                );
                return;
            }
        };

        if module.name != LOOPBACK_MODULE {
            log::debug!(
                "Module {} for ALSA card '{}' {} is not a loopback module",
                module.index,
                request.card_name,
                request.direction.stream_kind()
            );
            return;
        }

        log::debug!(
            "Module {} for ALSA card '{}' {} is a loopback module",
            module.index,
            request.card_name,
            request.direction.stream_kind()
        );
        request.add_module(self.module_index);
    }
}

/// Finds every loopback module attached to ALSA card `card_name` in `direction`.
///
/// `callback` receives the card name, the direction and the matching module
/// indices in the order they were confirmed. It is not called if the listing
/// fails; that error is escalated on `connection` instead. Needs a `LocalSet`.
pub fn find_loopback<F>(connection: &Connection, card_name: &str, direction: Direction, callback: F)
where
    F: FnOnce(String, Direction, Vec<u32>) + 'static,
{
    let request = Rc::new(FindLoopback {
        card_name: card_name.to_string(),
        direction,
        modules: RefCell::new(Vec::new()),
        aborted: Cell::new(false),
        callback: Some(Box::new(callback)),
    });

    let stream_kind = direction.stream_kind();
    log::debug!("Finding ALSA card '{}' {}", card_name, stream_kind);
    let mut listing = connection.server().list_streams(stream_kind);
    let connection = connection.clone();

    tokio::task::spawn_local(async move {
        loop {
            match listing.next().await {
                Listing::Item(stream) => {
                    let Some(module_index) = stream.owner_module else {
                        log::debug!(
                            "{} {} '{}' is not owned by a module",
                            stream_kind,
                            stream.index,
                            stream.name
                        );
                        continue;
                    };
                    log::debug!(
                        "Getting {} {} of {} {} '{}'",
                        stream_kind.device_kind(),
                        stream.device,
                        stream_kind,
                        stream.index,
                        stream.name
                    );
                    let task = VerifyLoopback {
                        request: request.clone(),
                        module_index,
                    };
                    tokio::task::spawn_local(task.run(connection.clone(), stream));
                }
                Listing::End => {
                    log::debug!("End of {} list reached", stream_kind);
                    break;
                }
                Listing::Failed(e) => {
                    request.abort();
                    connection.escalate(e.context(format!("Error listing audio server {}s", stream_kind)));
                    break;
                }
            }
        }
        // Dropping `request` here releases the listing's reference.
    });
}

/// Awaitable form of [`find_loopback`]. `None` when the search was abandoned
/// because the listing failed.
pub async fn find_loopback_modules(
    connection: &Connection,
    card_name: &str,
    direction: Direction,
) -> Option<Vec<u32>> {
    let (tx, rx) = oneshot::channel();
    find_loopback(connection, card_name, direction, move |_, _, modules| {
        let _ = tx.send(modules);
    });
    rx.await.ok()
}
