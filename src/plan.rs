//! Trip plans produced by the natural-language itinerary parser.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::domain::types::{Precedence, RouteConfig, Waypoint};
use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginHint {
    #[default]
    #[serde(rename = "current location")]
    CurrentLocation,
    Home,
    Address,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishHint {
    #[default]
    None,
    Address,
    PlaceQuery,
    #[serde(other)]
    Unknown,
}

/// `constraints` holds `[after, before]` pairs of indices into `stops`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatPlan {
    #[serde(default)]
    pub origin_hint: OriginHint,
    #[serde(default)]
    pub origin_value: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stops: Vec<String>,
    #[serde(default)]
    pub finish_hint: FinishHint,
    #[serde(default)]
    pub finish_value: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub constraints: Vec<[i64; 2]>,
}

/// A plan laid out as solver input.
#[derive(Debug, Clone, PartialEq)]
pub struct TripPlan {
    pub waypoints: Vec<Waypoint>,
    pub route: RouteConfig,
    pub precedence: Precedence,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ChatPlan {
    /// Parse model output: strict JSON, or the outermost `{...}` inside
    /// surrounding prose or code fences.
    pub fn from_llm_text(text: &str) -> Result<Self, PlanError> {
        if let Ok(plan) = serde_json::from_str::<ChatPlan>(text.trim()) {
            return Ok(plan);
        }
        let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) else {
            return Err(PlanError::NoJsonObject);
        };
        if close < open {
            return Err(PlanError::NoJsonObject);
        }
        debug!("Recovering plan JSON from chars {}..={}", open, close);
        Ok(serde_json::from_str(&text[open..=close])?)
    }

    /// Lay the plan out as `[origin, stops..., finish?]`.
    ///
    /// An explicit origin address wins over `default_origin`. Stop indices in
    /// `constraints` shift by one for the origin; pairs that do not name two
    /// distinct stops are dropped.
    pub fn into_trip(self, default_origin: Waypoint, round_trip: bool) -> TripPlan {
        let origin = match (self.origin_hint, non_empty(&self.origin_value)) {
            (OriginHint::Address, Some(address)) => Waypoint::Address(address.to_string()),
            _ => default_origin,
        };

        let mut waypoints = Vec::with_capacity(self.stops.len() + 2);
        waypoints.push(origin);
        waypoints.extend(
            self.stops
                .iter()
                .map(|s| s.trim())
                .map(|s| Waypoint::Address(s.to_string())),
        );

        let stop_count = self.stops.len() as i64;
        let mut precedence = Precedence::new();
        for [after, before] in self.constraints {
            let in_range = |i: i64| (0..stop_count).contains(&i);
            if !in_range(after) || !in_range(before) || after == before {
                warn!("Dropping constraint [{}, {}] for {} stops", after, before, stop_count);
                continue;
            }
            let befores = precedence.entry(after as usize + 1).or_default();
            if !befores.contains(&(before as usize + 1)) {
                befores.push(before as usize + 1);
            }
        }

        let finish = match self.finish_hint {
            FinishHint::Address | FinishHint::PlaceQuery => non_empty(&self.finish_value),
            _ => None,
        };
        let mut route = if round_trip {
            RouteConfig::round_trip(0)
        } else {
            RouteConfig::open(0)
        };
        if let Some(finish) = finish {
            waypoints.push(Waypoint::Address(finish.to_string()));
            route = route.with_end(waypoints.len() - 1);
        }

        TripPlan {
            waypoints,
            route,
            precedence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LatLng;
    use rstest::rstest;

    const PLAN: &str = r#"{
        "origin_hint": "current location",
        "origin_value": null,
        "stops": ["Bank", "Post office", "Pharmacy"],
        "finish_hint": "address",
        "finish_value": "12 Home St",
        "constraints": [[2, 0], [1, 7], [1, 1]]
    }"#;

    fn here() -> Waypoint {
        LatLng::new(1.3, 103.8).into()
    }

    #[test]
    fn lays_out_origin_stops_and_finish() {
        let trip = ChatPlan::from_llm_text(PLAN).unwrap().into_trip(here(), false);
        assert_eq!(trip.waypoints.len(), 5);
        assert_eq!(trip.waypoints[0], here());
        assert_eq!(trip.waypoints[4], Waypoint::from("12 Home St"));
        assert_eq!(trip.route.fixed_end(), Some(4));
        // Pharmacy (3) after Bank (1); the other pairs are out of range or self-referential
        assert_eq!(trip.precedence.len(), 1);
        assert_eq!(trip.precedence[&3], vec![1]);
    }

    #[rstest]
    #[case("Sure! Here you go:\n```json\n{\"stops\": [\"A\"]}\n```")]
    #[case("{\"stops\": [\"A\"], \"constraints\": null}")]
    #[case("  {\"stops\":[\"A\"]}  ")]
    fn recovers_json_from_chatty_output(#[case] text: &str) {
        let plan = ChatPlan::from_llm_text(text).unwrap();
        assert_eq!(plan.stops, vec!["A".to_string()]);
        assert!(plan.constraints.is_empty());
        assert_eq!(plan.finish_hint, FinishHint::None);
    }

    #[rstest]
    #[case("no json here")]
    #[case("} backwards {")]
    fn rejects_text_without_an_object(#[case] text: &str) {
        assert!(matches!(ChatPlan::from_llm_text(text), Err(PlanError::NoJsonObject)));
    }

    #[test]
    fn schema_mismatch_is_reported() {
        assert!(matches!(
            ChatPlan::from_llm_text("{\"stops\": 42}"),
            Err(PlanError::Schema(_))
        ));
    }

    #[test]
    fn explicit_origin_address_wins() {
        let plan = ChatPlan {
            origin_hint: OriginHint::Address,
            origin_value: Some("1 Start Rd".to_string()),
            stops: vec!["X".to_string()],
            ..ChatPlan::default()
        };
        let trip = plan.into_trip(here(), true);
        assert_eq!(trip.waypoints[0], Waypoint::from("1 Start Rd"));
        assert!(trip.route.round_trip);
        assert_eq!(trip.route.fixed_end(), None);
    }

    #[test]
    fn unknown_hints_are_tolerated() {
        let plan = ChatPlan::from_llm_text(
            r#"{"origin_hint": "office", "finish_hint": "somewhere", "finish_value": "Y", "stops": []}"#,
        )
        .unwrap();
        assert_eq!(plan.origin_hint, OriginHint::Unknown);
        let trip = plan.into_trip(here(), false);
        assert_eq!(trip.waypoints, vec![here()]);
    }
}
