#[cfg(test)]
mod tests {
    use crate::event_bus::EventBus;
    use common::{EventKind, PlayerEvent, SessionState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_dispatch_only_reaches_matching_kind() {
        let bus = EventBus::new();
        let loaded = Arc::new(AtomicUsize::new(0));
        let counter = loaded.clone();
        bus.add_listener(EventKind::Loaded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.dispatch(&PlayerEvent::Unloading);
        assert_eq!(loaded.load(Ordering::SeqCst), 0);

        let delivered = bus.dispatch(&PlayerEvent::Loaded {
            uri: "test:a".to_string(),
        });
        assert_eq!(delivered, 1);
        assert_eq!(loaded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.add_listener(EventKind::Streaming, move |_| {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        bus.dispatch(&PlayerEvent::Streaming);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_listener_does_not_stop_later_listeners() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.add_listener(EventKind::StateChanged, |_| anyhow::bail!("listener broke"));
        bus.add_listener(EventKind::StateChanged, |_| panic!("listener panicked"));
        let counter = reached.clone();
        bus.add_listener(EventKind::StateChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let delivered = bus.dispatch(&PlayerEvent::StateChanged {
            from: SessionState::Attached,
            to: SessionState::Loading,
        });
        assert_eq!(delivered, 1);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = bus.add_listener(EventKind::Detach, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.dispatch(&PlayerEvent::Detach);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_registered_during_dispatch_applies_to_next_event() {
        let bus = Arc::new(EventBus::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let bus_handle = bus.clone();
        let counter = late_calls.clone();
        bus.add_listener(EventKind::Attach, move |_| {
            let counter = counter.clone();
            bus_handle.add_listener(EventKind::Attach, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        bus.dispatch(&PlayerEvent::Attach);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        bus.dispatch(&PlayerEvent::Attach);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_drops_every_listener() {
        let bus = EventBus::new();
        bus.add_listener(EventKind::Loading, |_| Ok(()));
        bus.add_listener(EventKind::Loaded, |_| Ok(()));
        assert_eq!(bus.listener_count(), 2);

        bus.clear();
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.dispatch(&PlayerEvent::Streaming), 0);
    }
}
