pub mod channels;
pub mod intent;
pub mod notification;

pub use channels::{
    NotificationConsumer, NotificationProducer, TriggerConsumer, TriggerProducer,
    create_notification_channel, create_trigger_channel,
};
pub use intent::Intent;
pub use notification::{Alert, AlertCategory, AlertLevel, Notification};
