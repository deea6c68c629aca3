use serde::Serialize;

use super::notification::NotificationRecord;

/// Label of the action link shown on toasts that point at a talk.
pub const TALK_ACTION_LABEL: &str = "View talk";

/// An action link rendered on a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastAction {
    pub label: String,
    pub href: String,
}

/// What the presentation layer needs to draw one toast.
///
/// The live countdown lives next to it in the queue; this struct is plain
/// data so it can be broadcast to any number of UI surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastViewModel {
    pub id: String,
    pub title: String,
    pub message: String,
    pub actions: Vec<ToastAction>,
}

impl ToastViewModel {
    pub fn from_record(record: &NotificationRecord) -> Self {
        let actions = record
            .toast_link()
            .map(|href| {
                vec![ToastAction {
                    label: TALK_ACTION_LABEL.to_string(),
                    href,
                }]
            })
            .unwrap_or_default();

        Self {
            id: record.id.clone(),
            title: record.display_title().to_string(),
            message: record.message.clone(),
            actions,
        }
    }
}
