// Communication channels - lock-free SPSC queues between threads
// Trigger commands flow to the audio thread, notifications flow to the UI

use crate::audio::engine::TriggerCommand;
use crate::messaging::notification::Notification;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

/// Default capacity of the trigger channel (commands in flight)
pub const TRIGGER_CHANNEL_CAPACITY: usize = 4096;

/// Default capacity of the notification channel
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

pub type TriggerProducer = ringbuf::HeapProd<TriggerCommand>;
pub type TriggerConsumer = ringbuf::HeapCons<TriggerCommand>;

pub fn create_trigger_channel(capacity: usize) -> (TriggerProducer, TriggerConsumer) {
    let rb = HeapRb::<TriggerCommand>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Push a notification, discarding it when the UI is not keeping up
///
/// Returns false when the notification was dropped.
pub fn notify(producer: &mut NotificationProducer, notification: Notification) -> bool {
    producer.try_push(notification).is_ok()
}

/// Drain every pending notification (UI side)
pub fn drain_notifications(consumer: &mut NotificationConsumer) -> Vec<Notification> {
    consumer.pop_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_channel_drops_when_full() {
        let (mut tx, mut rx) = create_notification_channel(2);
        assert!(notify(&mut tx, Notification::StepChanged(Some(0))));
        assert!(notify(&mut tx, Notification::StepChanged(Some(1))));
        assert!(!notify(&mut tx, Notification::StepChanged(Some(2))));

        let drained = drain_notifications(&mut rx);
        assert_eq!(
            drained,
            vec![
                Notification::StepChanged(Some(0)),
                Notification::StepChanged(Some(1))
            ]
        );
        assert!(drain_notifications(&mut rx).is_empty());
    }
}
