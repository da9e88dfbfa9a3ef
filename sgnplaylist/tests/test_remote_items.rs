use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use sgnplaylist::{is_eligible, ManualClock, PlaylistItem, Scheduler, DEFAULT_ITEM_DURATION_SECS};

// 2024-01-08 est un lundi
fn monday_noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 8)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn remote_items() -> Vec<PlaylistItem> {
    serde_json::from_value(json!([
        {
            "id": "no-duration",
            "kind": "media",
            "url": "https://cdn.example.com/a.png",
            "media_type": "image",
            "duration": null
        },
        {
            "id": "negative",
            "kind": "media",
            "url": "https://cdn.example.com/b.png",
            "media_type": "image",
            "duration": -30
        },
        {
            "id": "bad-day",
            "kind": "media",
            "url": "https://cdn.example.com/c.png",
            "media_type": "image",
            "duration": 5,
            "days": [1, 8]
        },
        {
            "id": "weekday",
            "kind": "media",
            "url": "https://cdn.example.com/d.png",
            "media_type": "image",
            "duration": "7",
            "days": [1, 2, 3, 4, 5]
        }
    ]))
    .expect("one malformed field rejected the whole playlist")
}

#[test]
fn test_malformed_duration_falls_back_to_default() {
    let items = remote_items();

    assert_eq!(items.len(), 4);
    assert_eq!(items[0].duration_seconds, DEFAULT_ITEM_DURATION_SECS);
    assert_eq!(items[1].duration_seconds, DEFAULT_ITEM_DURATION_SECS);
    assert_eq!(items[3].duration_seconds, 7);
}

#[test]
fn test_out_of_range_day_only_disables_its_item() {
    let items = remote_items();
    let now = monday_noon();

    assert!(is_eligible(&items[0], now));
    assert!(is_eligible(&items[1], now));
    assert!(!is_eligible(&items[2], now));
    assert!(is_eligible(&items[3], now));

    let mut scheduler = Scheduler::new(ManualClock::new(now));
    let mut played = vec![scheduler.replace_items(items).unwrap().id.clone()];
    for _ in 0..5 {
        played.push(scheduler.advance().unwrap().id.clone());
    }

    assert!(!played.iter().any(|id| id == "bad-day"));
    assert!(played.iter().any(|id| id == "weekday"));
}
