// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use serde_json::{json, Map, Value};

use crate::error::{ApiError, ApiJson};
use crate::past::PastDate;
use crate::refresh::{ensure_fresh, LbParams, VsParams};
use crate::AppState;

/// Aggregate the state of a virtual server from its primary members:
/// a down member degrades an up service, an up member lifts a down one to
/// degraded, and only-disabled members leave the service disabled.
pub fn aggregate_state(states: &[String]) -> &'static str {
    let mut state = match states.first().map(String::as_str) {
        None => return "up",
        Some("up") => "up",
        Some("down") => "down",
        Some("disabled") => "disabled",
        Some(_) => "unknown",
    };
    for rstate in &states[1..] {
        match rstate.as_str() {
            "up" => match state {
                "disabled" => state = "up",
                "down" => state = "degraded",
                _ => {}
            },
            "down" => match state {
                "up" => state = "degraded",
                "disabled" => state = "down",
                _ => {}
            },
            _ => {}
        }
    }
    state
}

/// Extra rows merged into a detail document: primary fields win, and
/// numeric-looking values come out as numbers.
pub fn merge_extra(document: &mut Map<String, Value>, extra: &BTreeMap<String, String>) {
    for (key, value) in extra {
        if document.contains_key(key) {
            continue;
        }
        let value = match value.parse::<i64>() {
            Ok(number) => json!(number),
            Err(_) => json!(value),
        };
        document.insert(key.clone(), value);
    }
}

/// `GET /loadbalancer/{lb}/virtualserver/` — `{vs: [name, vip, state]}`.
/// Virtual servers without any real server do not appear.
pub async fn list(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<LbParams>,
) -> Result<ApiJson, ApiError> {
    ensure_fresh(&state, &past, &params.lb, None, None, false).await;
    let rows = state.store.list_virtualservers(&past.0, &params.lb).await?;
    let mut grouped: BTreeMap<String, (String, String, Vec<String>)> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.vs)
            .or_insert_with(|| (row.name.clone(), row.vip.clone(), Vec::new()))
            .2
            .push(row.rstate);
    }
    let mut document = Map::new();
    for (vs, (name, vip, states)) in grouped {
        document.insert(vs, json!([name, vip, aggregate_state(&states)]));
    }
    Ok(ApiJson(Value::Object(document)))
}

/// `GET /loadbalancer/{lb}/virtualserver/{vs}/` — detail with the
/// aggregated state and the extra attributes flattened in.
pub async fn detail(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<VsParams>,
) -> Result<ApiJson, ApiError> {
    ensure_fresh(&state, &past, &params.lb, Some(&params.vs), None, false).await;
    let detail = state
        .store
        .get_virtualserver(&past.0, &params.lb, &params.vs)
        .await?
        .ok_or(ApiError::NotFound)?;
    let mut document = Map::new();
    document.insert("name".into(), json!(detail.name));
    document.insert("VIP".into(), json!(detail.vip));
    document.insert("protocol".into(), json!(detail.protocol));
    document.insert("mode".into(), json!(detail.mode));
    document.insert("state".into(), json!(aggregate_state(&detail.states)));
    merge_extra(&mut document, &detail.extra);
    Ok(ApiJson(Value::Object(document)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aggregation_rules() {
        assert_eq!(aggregate_state(&states(&[])), "up");
        assert_eq!(aggregate_state(&states(&["up", "up"])), "up");
        assert_eq!(aggregate_state(&states(&["up", "down"])), "degraded");
        assert_eq!(aggregate_state(&states(&["down", "up"])), "degraded");
        assert_eq!(aggregate_state(&states(&["down", "down"])), "down");
        assert_eq!(aggregate_state(&states(&["disabled", "disabled"])), "disabled");
        assert_eq!(aggregate_state(&states(&["disabled", "up"])), "up");
        assert_eq!(aggregate_state(&states(&["disabled", "down"])), "down");
        assert_eq!(aggregate_state(&states(&["down", "disabled"])), "down");
        assert_eq!(aggregate_state(&states(&["up", "disabled"])), "up");
    }

    #[test]
    fn extras_do_not_overwrite_and_coerce_numbers() {
        let mut document = Map::new();
        document.insert("name".into(), json!("primary"));
        let mut extra = BTreeMap::new();
        extra.insert("name".into(), "shadow".to_string());
        extra.insert("check delay".into(), "30".to_string());
        extra.insert("healthcheck".into(), "http".to_string());
        merge_extra(&mut document, &extra);
        assert_eq!(document["name"], json!("primary"));
        assert_eq!(document["check delay"], json!(30));
        assert_eq!(document["healthcheck"], json!("http"));
    }
}
