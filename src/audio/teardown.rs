use super::connection::Connection;
use super::direction::Direction;
use super::find_loopback::find_loopback;

fn unload_loopback(connection: &Connection, module_index: u32) {
    log::debug!("Deinstantiating loopback module {}", module_index);
    let connection = connection.clone();
    tokio::task::spawn_local(async move {
        match connection.server().unload_module(module_index).await {
            Ok(()) => log::debug!("Successfully deinstantiated loopback module {}", module_index),
            Err(e) => log::warn!(
                "Error deinstantiating loopback module {}: {:#}",
                module_index,
                e
            ),
        }
    });
}

/// Removes every loopback for `card_name` in `direction`. Each removal is
/// issued on its own and failures are only logged. Needs a `LocalSet`.
pub fn ensure_no_loopback(connection: &Connection, card_name: &str, direction: Direction) {
    let handle = connection.clone();
    find_loopback(connection, card_name, direction, move |card_name, direction, modules| {
        if modules.is_empty() {
            log::warn!(
                "No loopback module(s) for ALSA card '{}' {}",
                card_name,
                direction.master_kind()
            );
            return;
        }
        log::debug!(
            "Deinstantiating loopback modules for ALSA card '{}' {}",
            card_name,
            direction.master_kind()
        );
        for module_index in modules {
            unload_loopback(&handle, module_index);
        }
    });
}
