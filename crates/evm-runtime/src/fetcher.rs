use evm_core::{ControllerId, Event, FetchPlan};
use evm_device::DeviceGateway;
use tracing::warn;

/// Result of executing one controller's [`FetchPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Plan order, placeholders included.
    pub events: Vec<Event>,
    pub placeholders: usize,
    /// Indices skipped this run (gateway failure or wrong slot returned).
    pub transport_errors: usize,
    pub attempted: usize,
}

/// Query every planned index in order.
///
/// Empty slots become placeholders. Failures are logged and skipped so the
/// index stays missing and is planned again next run.
pub async fn fetch_planned(
    gateway: &dyn DeviceGateway,
    controller: ControllerId,
    plan: &FetchPlan,
) -> FetchOutcome {
    let mut out = FetchOutcome::default();

    for f in &plan.fetches {
        out.attempted += 1;
        match gateway.get_event(controller, f.index).await {
            Ok(Some(e)) if e.controller_id == controller && e.index == f.index => {
                out.events.push(e);
            }
            Ok(Some(e)) => {
                warn!(
                    controller,
                    index = f.index,
                    returned = e.index,
                    "device returned a different slot, skipping"
                );
                out.transport_errors += 1;
            }
            Ok(None) => {
                warn!(controller, index = f.index, "missing event");
                out.events.push(Event::placeholder(controller, f.index));
                out.placeholders += 1;
            }
            Err(err) => {
                warn!(controller, index = f.index, error = %err, "get-event failed");
                out.transport_errors += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evm_core::{plan_fetch, ControllerBounds, FetchPolicy, Gap, GapKind, Interval};
    use evm_device::DeviceError;
    use std::sync::Mutex;

    /// Slot `i` holds event `i`, except: 3 is empty, 4 fails, 5 answers with slot 50.
    struct Quirky {
        calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl DeviceGateway for Quirky {
        fn name(&self) -> &'static str {
            "quirky"
        }

        async fn get_event(
            &self,
            controller: ControllerId,
            index: u32,
        ) -> Result<Option<Event>, DeviceError> {
            self.calls.lock().unwrap().push(index);
            match index {
                3 => Ok(None),
                4 => Err(DeviceError::Timeout),
                5 => Ok(Some(Event::placeholder(controller, 50))),
                ix => Ok(Some(Event {
                    card_number: 1000 + ix,
                    ..Event::placeholder(controller, ix)
                })),
            }
        }

        async fn get_event_index(&self, _controller: ControllerId) -> Result<u32, DeviceError> {
            Ok(0)
        }
    }

    fn plan_1_to_6() -> FetchPlan {
        let gaps = vec![Gap {
            kind: GapKind::Tail,
            interval: Interval::new(1, u32::MAX).unwrap(),
        }];
        let policy = FetchPolicy {
            batch_size: 10,
            ..FetchPolicy::default()
        };
        plan_fetch(&gaps, &ControllerBounds::new(1, 6, 6), &policy)
    }

    #[tokio::test]
    async fn empty_slot_placeholder_and_failures_skipped() {
        let gw = Quirky {
            calls: Mutex::new(Vec::new()),
        };
        let out = fetch_planned(&gw, 7, &plan_1_to_6()).await;

        let indices: Vec<u32> = out.events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 6]);
        assert!(out.events[2].is_placeholder());
        assert_eq!(out.events[0].card_number, 1001);
        assert_eq!(out.placeholders, 1);
        assert_eq!(out.transport_errors, 2);
        assert_eq!(out.attempted, 6);
        assert_eq!(*gw.calls.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn empty_plan_makes_no_calls() {
        let gw = Quirky {
            calls: Mutex::new(Vec::new()),
        };
        let out = fetch_planned(&gw, 7, &FetchPlan::default()).await;
        assert_eq!(out, FetchOutcome::default());
        assert!(gw.calls.lock().unwrap().is_empty());
    }
}
