//! Maps a generic push request onto an APNs notification.
//!
//! Rules apply in a fixed order and later rules may overwrite what earlier
//! ones set: plain message, then title/body, then the structured alert
//! dictionary.

use crate::adapters::push::{ApnsNotification, ApnsPriority, ApsSound, Payload};
use crate::domain::{Alert, PushRequest, Sound, SoundField};
use time::OffsetDateTime;

/// Builds the per-request notification template. The device token is left
/// empty and stamped per worker.
#[must_use]
pub fn build(req: &PushRequest) -> ApnsNotification {
    let mut payload = Payload::default();

    if !req.message.is_empty() && req.title.is_empty() {
        payload.alert_text(&req.message);
    }

    if let Some(badge) = req.badge.filter(|b| *b >= 0) {
        payload.aps.badge = Some(badge);
    }

    if req.mutable_content {
        payload.aps.mutable_content = Some(1);
    }

    if let Some(sound) = &req.sound {
        payload.aps.sound = Some(resolve_sound(sound));
    }
    if !req.sound_name.is_empty() {
        payload.update_sound(|sound| sound.name.clone_from(&req.sound_name));
    }
    if req.sound_volume > 0.0 {
        payload.update_sound(|sound| sound.volume = req.sound_volume);
    }

    if req.content_available {
        payload.aps.content_available = Some(1);
    }

    if !req.url_args.is_empty() {
        payload.aps.url_args.clone_from(&req.url_args);
    }

    if !req.thread_id.is_empty() {
        payload.aps.thread_id = Some(req.thread_id.clone());
    }

    for (key, value) in &req.data {
        if key == "aps" {
            tracing::debug!("Ignoring custom data key that collides with the aps dictionary");
            continue;
        }
        payload.custom.insert(key.clone(), value.clone());
    }

    apply_alert(&mut payload, req);

    let mut notification = ApnsNotification::new(payload);
    notification.apns_id = non_empty(&req.apns_id);
    notification.topic = non_empty(&req.topic);
    notification.collapse_id = non_empty(&req.collapse_id);
    notification.push_type = non_empty(&req.push_type);
    notification.expiration = req.expiration.and_then(|secs| match OffsetDateTime::from_unix_timestamp(secs) {
        Ok(at) => Some(at),
        Err(e) => {
            tracing::warn!(expiration = secs, error = %e, "Ignoring out of range expiration");
            None
        }
    });
    notification.priority = match req.priority.as_str() {
        "normal" => Some(ApnsPriority::Low),
        "high" => Some(ApnsPriority::High),
        _ => None,
    };

    notification
}

fn apply_alert(payload: &mut Payload, req: &PushRequest) {
    if !req.title.is_empty() {
        payload.update_alert(|dictionary| {
            dictionary.title = Some(req.title.clone());
            if !req.message.is_empty() {
                dictionary.body = Some(req.message.clone());
            }
        });
    }

    let Alert {
        title,
        subtitle,
        body,
        action,
        action_loc_key,
        launch_image,
        loc_key,
        loc_args,
        title_loc_key,
        title_loc_args,
        summary_arg,
        summary_arg_count,
    } = &req.alert;

    let has_dictionary_fields = [title, subtitle, body, action, action_loc_key, launch_image, loc_key, title_loc_key, summary_arg]
        .iter()
        .any(|field| !field.is_empty())
        || !loc_args.is_empty()
        || !title_loc_args.is_empty()
        || *summary_arg_count > 0;

    if has_dictionary_fields {
        payload.update_alert(|dictionary| {
            set_if_present(&mut dictionary.title, title);
            set_if_present(&mut dictionary.subtitle, subtitle);
            set_if_present(&mut dictionary.title_loc_key, title_loc_key);
            if !loc_args.is_empty() {
                dictionary.loc_args.clone_from(loc_args);
            }
            if !title_loc_args.is_empty() {
                dictionary.title_loc_args.clone_from(title_loc_args);
            }
            set_if_present(&mut dictionary.body, body);
            set_if_present(&mut dictionary.launch_image, launch_image);
            set_if_present(&mut dictionary.loc_key, loc_key);
            set_if_present(&mut dictionary.action, action);
            set_if_present(&mut dictionary.action_loc_key, action_loc_key);
            set_if_present(&mut dictionary.summary_arg, summary_arg);
            if *summary_arg_count > 0 {
                dictionary.summary_arg_count = Some(*summary_arg_count);
            }
        });
    }

    if !req.category.is_empty() {
        payload.aps.category = Some(req.category.clone());
    }
}

/// Converts the request sound, whatever shape it arrived in, into the wire form.
#[must_use]
pub fn resolve_sound(sound: &SoundField) -> ApsSound {
    match sound {
        SoundField::Name(name) => ApsSound::Name(name.clone()),
        SoundField::Structured(sound) => ApsSound::Structured(sound.clone()),
        SoundField::Raw(mapping) => ApsSound::Structured(Sound::from_mapping(mapping)),
    }
}

fn set_if_present(slot: &mut Option<String>, value: &str) {
    if !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn request() -> PushRequest {
        PushRequest::ios(vec!["token".to_string()], "")
    }

    fn aps(req: &PushRequest) -> Value {
        serde_json::to_value(&build(req).payload).expect("payload serializes")["aps"].clone()
    }

    #[test]
    fn test_message_without_title_is_plain_alert() {
        let mut req = request();
        req.message = "Welcome".to_string();
        assert_eq!(aps(&req)["alert"], json!("Welcome"));
    }

    #[test]
    fn test_title_and_message_form_dictionary() {
        let mut req = request();
        req.title = "Hello".to_string();
        req.message = "World".to_string();
        assert_eq!(aps(&req)["alert"], json!({"title": "Hello", "body": "World"}));
    }

    #[test]
    fn test_structured_alert_overrides_title_and_body() {
        let mut req = request();
        req.title = "Hello".to_string();
        req.message = "World".to_string();
        req.alert.title = "Override".to_string();
        req.alert.body = "Body".to_string();
        req.alert.subtitle = "Sub".to_string();
        req.alert.loc_args = vec!["a".to_string(), "b".to_string()];
        req.alert.summary_arg_count = 3;

        assert_eq!(
            aps(&req)["alert"],
            json!({
                "title": "Override",
                "subtitle": "Sub",
                "body": "Body",
                "loc-args": ["a", "b"],
                "summary-arg-count": 3
            })
        );
    }

    #[test]
    fn test_structured_alert_keeps_plain_message_as_body() {
        let mut req = request();
        req.message = "World".to_string();
        req.alert.subtitle = "Sub".to_string();
        assert_eq!(aps(&req)["alert"], json!({"subtitle": "Sub", "body": "World"}));
    }

    #[test]
    fn test_badge_zero_is_applied_negative_and_absent_are_not() {
        let mut req = request();
        req.badge = Some(0);
        assert_eq!(aps(&req)["badge"], json!(0));

        req.badge = Some(-1);
        assert!(aps(&req).get("badge").is_none());

        req.badge = None;
        assert!(aps(&req).get("badge").is_none());
    }

    #[test]
    fn test_sound_shapes_resolve_equivalently() {
        let expected = Sound { critical: 1, name: "default".to_string(), volume: 0.0 };

        let mut mapping = serde_json::Map::new();
        mapping.insert("name".to_string(), json!("default"));
        mapping.insert("critical".to_string(), json!(1));

        assert_eq!(resolve_sound(&SoundField::Raw(mapping)), ApsSound::Structured(expected.clone()));
        assert_eq!(resolve_sound(&SoundField::Structured(expected.clone())), ApsSound::Structured(expected));
        assert_eq!(resolve_sound(&SoundField::Name("default".to_string())), ApsSound::Name("default".to_string()));

        let mut req = request();
        req.sound = Some(SoundField::Name("default".to_string()));
        assert_eq!(aps(&req)["sound"], json!("default"));
    }

    #[test]
    fn test_sound_name_and_volume_apply_after_generic_sound() {
        let mut req = request();
        req.sound = Some(SoundField::Name("ping".to_string()));
        req.sound_name = "chime".to_string();
        req.sound_volume = 0.5;
        assert_eq!(aps(&req)["sound"], json!({"name": "chime", "volume": 0.5}));
    }

    #[test]
    fn test_flags_only_set_when_true() {
        let mut req = request();
        assert!(aps(&req).get("content-available").is_none());
        assert!(aps(&req).get("mutable-content").is_none());

        req.content_available = true;
        req.mutable_content = true;
        assert_eq!(aps(&req)["content-available"], json!(1));
        assert_eq!(aps(&req)["mutable-content"], json!(1));
    }

    #[test]
    fn test_custom_data_copied_verbatim() {
        let mut req = request();
        req.data.insert("order".to_string(), json!({"id": 7, "items": [1, 2]}));
        let payload = serde_json::to_value(&build(&req).payload).expect("payload serializes");
        assert_eq!(payload["order"], json!({"id": 7, "items": [1, 2]}));
    }

    #[test]
    fn test_priority_mapping() {
        let mut req = request();
        assert_eq!(build(&req).priority, None);

        req.priority = "normal".to_string();
        assert_eq!(build(&req).priority, Some(ApnsPriority::Low));

        req.priority = "high".to_string();
        assert_eq!(build(&req).priority, Some(ApnsPriority::High));

        req.priority = "urgent".to_string();
        assert_eq!(build(&req).priority, None);
    }

    #[test]
    fn test_out_of_range_expiration_is_left_unset() {
        let mut req = request();
        req.expiration = Some(i64::MAX);
        assert!(build(&req).expiration.is_none());

        req.expiration = Some(0);
        assert_eq!(build(&req).expiration.map(OffsetDateTime::unix_timestamp), Some(0));
    }

    #[test]
    fn test_headers_copied_when_present() {
        let mut req = request();
        req.expiration = Some(1_700_000_000);
        req.topic = "com.example.app".to_string();
        req.collapse_id = "group".to_string();
        req.push_type = "alert".to_string();
        req.thread_id = "thread".to_string();
        req.category = "cat".to_string();
        req.url_args = vec!["a".to_string()];

        let notification = build(&req);
        assert_eq!(notification.expiration.map(OffsetDateTime::unix_timestamp), Some(1_700_000_000));
        assert_eq!(notification.topic.as_deref(), Some("com.example.app"));
        assert_eq!(notification.collapse_id.as_deref(), Some("group"));
        assert_eq!(notification.push_type.as_deref(), Some("alert"));
        assert!(notification.apns_id.is_none());
        assert!(notification.device_token.is_empty());

        let aps = aps(&req);
        assert_eq!(aps["thread-id"], json!("thread"));
        assert_eq!(aps["category"], json!("cat"));
        assert_eq!(aps["url-args"], json!(["a"]));
    }
}
