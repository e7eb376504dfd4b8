//! Per-device coalescing of Change events.
//!
//! The first Change for a device opens a window; further Changes inside it
//! replace the held payload, and the latest one is emitted when the window
//! closes. Add and Remove pass straight through and discard any held Change
//! for the same device.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::event::{DeviceAction, DeviceEvent};

/// Run until `input` closes, then flush held Changes in deadline order.
pub async fn debounce(
    mut input: mpsc::Receiver<DeviceEvent>,
    output: mpsc::Sender<DeviceEvent>,
    window: Duration,
) {
    let mut held: HashMap<String, (Instant, DeviceEvent)> = HashMap::new();

    loop {
        let next_deadline = held.values().map(|(deadline, _)| *deadline).min();
        tokio::select! {
            received = input.recv() => {
                let Some(event) = received else {
                    for event in take_due(&mut held, None) {
                        if output.send(event).await.is_err() {
                            return;
                        }
                    }
                    return;
                };
                match event.action {
                    DeviceAction::Changed => match held.get_mut(&event.device_id) {
                        Some((_, payload)) => *payload = event,
                        None => {
                            held.insert(event.device_id.clone(), (Instant::now() + window, event));
                        }
                    },
                    DeviceAction::Added | DeviceAction::Removed => {
                        held.remove(&event.device_id);
                        if output.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
            _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                for event in take_due(&mut held, Some(Instant::now())) {
                    if output.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Remove and return held events due by `now` (all of them for `None`),
/// oldest deadline first.
fn take_due(
    held: &mut HashMap<String, (Instant, DeviceEvent)>,
    now: Option<Instant>,
) -> Vec<DeviceEvent> {
    let mut due: Vec<(Instant, String)> = held
        .iter()
        .filter(|(_, (deadline, _))| now.is_none_or(|now| *deadline <= now))
        .map(|(id, (deadline, _))| (*deadline, id.clone()))
        .collect();
    due.sort();
    due.into_iter()
        .filter_map(|(_, id)| held.remove(&id).map(|(_, event)| event))
        .collect()
}
