use crate::notify::{Notification, NotificationKind, Notifier};

#[test]
fn given_no_subscribers_when_publishing_then_does_not_fail() {
    let notifier = Notifier::new();

    notifier.info("nobody is listening");
    notifier.error("still nobody");
}

/// **VALUE**: Every subscriber sees every notification, in publish order.
///
/// **WHY THIS MATTERS**: The front end and the log printer subscribe separately;
/// per-call ordering is what makes multi-step reports readable.
///
/// **BUG THIS CATCHES**: Would catch a single-consumer channel being used, or
/// kinds being swapped.
#[test]
fn given_two_subscribers_when_publishing_then_both_receive_in_order() {
    // GIVEN: Two subscribers
    let notifier = Notifier::with_capacity(8);
    let mut first = notifier.subscribe();
    let mut second = notifier.clone().subscribe();

    // WHEN: Publishing info then error
    notifier.info("launching");
    notifier.error("bind failed");

    // THEN: Both see the same sequence
    for rx in [&mut first, &mut second] {
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification {
                kind: NotificationKind::Info,
                message: "launching".to_string(),
            }
        );
        assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::Error);
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn given_notification_when_displayed_then_prefixed_with_kind() {
    let info = Notification {
        kind: NotificationKind::Info,
        message: "ok".to_string(),
    };
    let error = Notification {
        kind: NotificationKind::Error,
        message: "bad".to_string(),
    };

    assert_eq!(info.to_string(), "[info] ok");
    assert_eq!(error.to_string(), "[error] bad");
}
