//! Request/reply arrows
//!
//! Receivers record, as a text value, the name of the requester they are
//! serving. The receiver and requester histories are written independently,
//! so the only way to correlate them is temporal: the requester state active
//! at a receiver interval's boundary is the other end of the arrow.
//!
//! For a receiver interval `[t0, t1]` naming requester `X`:
//! - request arrow receiver → X at `t0`, lasting until the X interval
//!   active at `t0` ends;
//! - reply arrow X → receiver from the start of the X interval active at
//!   `t1` until `t1 + 1`.
//!
//! When no X interval is active at the boundary, that side is skipped and
//! the reason is reported as an [`ArrowMiss`]. Each side is looked up on
//! its own, so a missing request side never hides the reply side.
//!
//! Receiver intervals read from the store end at or before its committed
//! end time, and every attribute is back-filled from the store start, so a
//! full [`match_arrows`] pass only ever reports
//! [`MissReason::UnresolvedReference`]. The other two reasons only apply
//! to boundaries outside the store's written range.

use crate::entities::{entity_id, EntityId, RECEIVER, REQUESTER};
use crate::store::IntervalStore;
use crate::style::{OutputStyle, StyleRegistry, BALL_REPLY_ARROW_KEY, BALL_REQUEST_ARROW_KEY};
use crate::types::{AttributeId, Interval, Result, Timestamp};
use serde::Serialize;

/// Direction of an arrow in the request/reply exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowKind {
    /// Receiver → requester
    Request,
    /// Requester → receiver
    Reply,
}

/// A directed, timed arrow between two entities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Arrow {
    pub source_id: EntityId,
    pub destination_id: EntityId,
    pub time: Timestamp,
    pub duration: i64,
    pub kind: ArrowKind,
    pub style: OutputStyle,
}

/// Why one side of a receiver interval produced no arrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// No `Requester/<name>` attribute exists for the referenced name
    UnresolvedReference,
    /// The boundary lies past the store's committed end time
    NotBuilt,
    /// The requester has no interval covering the boundary
    NoInterval,
}

/// An arrow side that could not be matched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrowMiss {
    pub receiver_id: EntityId,
    /// Requester name recorded by the receiver
    pub reference: String,
    pub time: Timestamp,
    pub kind: ArrowKind,
    pub reason: MissReason,
}

/// Matched arrows plus the sides that could not be matched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArrowModel {
    pub arrows: Vec<Arrow>,
    pub misses: Vec<ArrowMiss>,
}

/// Requester interval active at `time`, or the reason there is none
fn requester_interval_at(
    store: &IntervalStore,
    requester: AttributeId,
    time: Timestamp,
) -> Result<std::result::Result<Interval, MissReason>> {
    Ok(match store.point_query_with_end(requester, time)? {
        (Some(interval), _) => Ok(interval),
        (None, committed_end) if time > committed_end => Err(MissReason::NotBuilt),
        (None, _) => Err(MissReason::NoInterval),
    })
}

/// Arrow from the receiver to the requester state active when the request arrived
pub fn request_arrow(
    receiver_id: EntityId,
    requester_id: EntityId,
    receiver: &Interval,
    active: &Interval,
    styles: &StyleRegistry,
) -> Arrow {
    Arrow {
        source_id: receiver_id,
        destination_id: requester_id,
        time: receiver.start,
        duration: active.end - receiver.start,
        kind: ArrowKind::Request,
        style: styles.get(BALL_REQUEST_ARROW_KEY),
    }
}

/// Arrow from the requester state active when the reply left back to the receiver
pub fn reply_arrow(
    receiver_id: EntityId,
    requester_id: EntityId,
    receiver: &Interval,
    active: &Interval,
    styles: &StyleRegistry,
) -> Arrow {
    Arrow {
        source_id: requester_id,
        destination_id: receiver_id,
        time: active.start,
        duration: receiver.end + 1 - active.start,
        kind: ArrowKind::Reply,
        style: styles.get(BALL_REPLY_ARROW_KEY),
    }
}

/// Add the arrows of one receiver interval to `model`, or the misses of
/// the sides that could not be matched
///
/// Intervals that do not hold a text reference are ignored.
fn match_receiver_interval(
    store: &IntervalStore,
    receiver_id: EntityId,
    interval: &Interval,
    styles: &StyleRegistry,
    model: &mut ArrowModel,
) -> Result<()> {
    let Some(reference) = interval.value.as_text() else {
        return Ok(());
    };
    let mut miss = |time: Timestamp, kind: ArrowKind, reason: MissReason| {
        log::trace!(
            "No {:?} arrow for receiver {} -> '{}' at {}: {:?}",
            kind,
            receiver_id,
            reference,
            time,
            reason
        );
        model.misses.push(ArrowMiss {
            receiver_id,
            reference: reference.to_string(),
            time,
            kind,
            reason,
        });
    };

    let Some(requester) = store.opt_attribute(&[REQUESTER, reference])? else {
        miss(interval.start, ArrowKind::Request, MissReason::UnresolvedReference);
        miss(interval.end, ArrowKind::Reply, MissReason::UnresolvedReference);
        return Ok(());
    };
    let requester_id = entity_id(requester);

    let request = match requester_interval_at(store, requester, interval.start)? {
        Ok(active) => Some(request_arrow(receiver_id, requester_id, interval, &active, styles)),
        Err(reason) => {
            miss(interval.start, ArrowKind::Request, reason);
            None
        }
    };
    let reply = match requester_interval_at(store, requester, interval.end)? {
        Ok(active) => Some(reply_arrow(receiver_id, requester_id, interval, &active, styles)),
        Err(reason) => {
            miss(interval.end, ArrowKind::Reply, reason);
            None
        }
    };

    model.arrows.extend(request.into_iter().chain(reply));
    Ok(())
}

/// Match every receiver interval intersecting `times` against its requester
pub fn match_arrows(
    store: &IntervalStore,
    times: &[Timestamp],
    styles: &StyleRegistry,
) -> Result<ArrowModel> {
    let receivers = store.resolve(&[RECEIVER, crate::attributes::WILDCARD])?;
    let intervals = store.range_query(&receivers, times)?;

    let mut model = ArrowModel::default();
    for receiver in receivers {
        let receiver_id = entity_id(receiver);
        for interval in intervals.get(&receiver).into_iter().flatten() {
            match_receiver_interval(store, receiver_id, interval, styles, &mut model)?;
        }
    }
    log::debug!(
        "Matched {} arrows, {} unmatched sides",
        model.arrows.len(),
        model.misses.len()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    /// Receiver interval [100, 250] naming requester X, whose states are
    /// [90, 199] and [200, 400]
    fn exchange() -> (IntervalStore, AttributeId, AttributeId) {
        let store = IntervalStore::new("trace", 0);
        let receiver = store.attribute_or_add(&["Receiver", "r1"]).unwrap();
        let x = store.attribute_or_add(&["Requester", "X"]).unwrap();
        store.modify_attribute(90, Value::Integer(0), x).unwrap();
        store.modify_attribute(100, Value::Text("X".into()), receiver).unwrap();
        store.modify_attribute(200, Value::Integer(1), x).unwrap();
        store.modify_attribute(251, Value::Absent, receiver).unwrap();
        store.modify_attribute(401, Value::Absent, x).unwrap();
        (store, receiver, x)
    }

    #[test]
    fn test_request_and_reply_arrows() {
        let (store, receiver, x) = exchange();
        store.close_history(500).unwrap();
        let styles = StyleRegistry::new();
        let model = match_arrows(&store, &[150], &styles).unwrap();

        assert!(model.misses.is_empty());
        assert_eq!(model.arrows.len(), 2);
        let request = &model.arrows[0];
        assert_eq!(request.kind, ArrowKind::Request);
        assert_eq!(
            (request.source_id, request.destination_id),
            (entity_id(receiver), entity_id(x))
        );
        assert_eq!((request.time, request.duration), (100, 99));
        assert_eq!(request.style.key(), Some(BALL_REQUEST_ARROW_KEY));

        let reply = &model.arrows[1];
        assert_eq!(reply.kind, ArrowKind::Reply);
        assert_eq!((reply.source_id, reply.destination_id), (entity_id(x), entity_id(receiver)));
        assert_eq!((reply.time, reply.duration), (200, 51));
    }

    #[test]
    fn test_late_requester_is_backfilled() {
        let store = IntervalStore::new("trace", 100);
        let receiver = store.attribute_or_add(&["Receiver", "r1"]).unwrap();
        store.modify_attribute(100, Value::Text("X".into()), receiver).unwrap();
        store.modify_attribute(251, Value::Absent, receiver).unwrap();
        // Requester appears after the receiver started
        let x = store.attribute_or_add(&["Requester", "X"]).unwrap();
        store.modify_attribute(200, Value::Integer(1), x).unwrap();
        store.close_history(300).unwrap();

        let model = match_arrows(&store, &[100, 250], &StyleRegistry::new()).unwrap();
        let kinds: Vec<ArrowKind> = model.arrows.iter().map(|a| a.kind).collect();
        // Requester history is back-filled from the store start, so both sides match
        assert_eq!(kinds, vec![ArrowKind::Request, ArrowKind::Reply]);
        assert_eq!(model.arrows[0].duration, 99);
    }

    #[test]
    fn test_unresolved_reference_reported() {
        let store = IntervalStore::new("trace", 0);
        let receiver = store.attribute_or_add(&["Receiver", "r1"]).unwrap();
        store.modify_attribute(10, Value::Text("ghost".into()), receiver).unwrap();
        store.close_history(20).unwrap();

        let model = match_arrows(&store, &[15], &StyleRegistry::new()).unwrap();
        assert!(model.arrows.is_empty());
        assert_eq!(model.misses.len(), 2);
        assert!(model
            .misses
            .iter()
            .all(|m| m.reason == MissReason::UnresolvedReference && m.reference == "ghost"));
    }

    #[test]
    fn test_arrow_arithmetic() {
        let styles = StyleRegistry::new();
        let receiver = Interval::new(AttributeId(1), 100, 250, Value::Text("X".into()));
        let at_request = Interval::new(AttributeId(2), 90, 300, Value::Integer(0));
        let at_reply = Interval::new(AttributeId(2), 200, 400, Value::Integer(1));

        let request = request_arrow(1, 2, &receiver, &at_request, &styles);
        assert_eq!((request.source_id, request.destination_id), (1, 2));
        assert_eq!((request.time, request.duration), (100, 200));

        let reply = reply_arrow(1, 2, &receiver, &at_reply, &styles);
        assert_eq!((reply.source_id, reply.destination_id), (2, 1));
        assert_eq!((reply.time, reply.duration), (200, 51));
    }

    #[test]
    fn test_boundary_lookup_reasons() {
        let (store, _, x) = exchange();
        assert!(requester_interval_at(&store, x, 150).unwrap().is_ok());
        assert_eq!(
            requester_interval_at(&store, x, 10_000).unwrap(),
            Err(MissReason::NotBuilt)
        );
        let late = IntervalStore::new("trace", 50);
        let y = late.attribute_or_add(&["Requester", "Y"]).unwrap();
        assert_eq!(
            requester_interval_at(&late, y, 10).unwrap(),
            Err(MissReason::NoInterval)
        );
    }

    #[test]
    fn test_request_side_misses_reply_still_matched() {
        // Requester history starts at 50; the receiver interval starts before it
        let store = IntervalStore::new("trace", 50);
        let x = store.attribute_or_add(&["Requester", "X"]).unwrap();
        store.modify_attribute(60, Value::Integer(1), x).unwrap();
        store.close_history(500).unwrap();

        let receiver = Interval::new(AttributeId(9), 10, 120, Value::Text("X".into()));
        let mut model = ArrowModel::default();
        match_receiver_interval(&store, 7, &receiver, &StyleRegistry::new(), &mut model).unwrap();

        assert_eq!(model.arrows.len(), 1);
        let reply = &model.arrows[0];
        assert_eq!(reply.kind, ArrowKind::Reply);
        assert_eq!((reply.source_id, reply.destination_id), (entity_id(x), 7));
        assert_eq!((reply.time, reply.duration), (60, 61));

        assert_eq!(model.misses.len(), 1);
        let miss = &model.misses[0];
        assert_eq!(
            (miss.kind, miss.time, miss.reason),
            (ArrowKind::Request, 10, MissReason::NoInterval)
        );
    }

    #[test]
    fn test_reply_side_not_built() {
        let (store, _, x) = exchange();
        // Committed up to 401; the receiver interval reaches past it
        let receiver = Interval::new(AttributeId(9), 100, 10_000, Value::Text("X".into()));
        let mut model = ArrowModel::default();
        match_receiver_interval(&store, 7, &receiver, &StyleRegistry::new(), &mut model).unwrap();

        let kinds: Vec<ArrowKind> = model.arrows.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ArrowKind::Request]);
        assert_eq!(model.arrows[0].destination_id, entity_id(x));
        assert_eq!(model.misses.len(), 1);
        assert_eq!(model.misses[0].kind, ArrowKind::Reply);
        assert_eq!(model.misses[0].reason, MissReason::NotBuilt);
    }

    #[test]
    fn test_non_text_values_ignored() {
        let (store, _, _) = exchange();
        store.close_history(500).unwrap();
        // Absent receiver intervals before 100 and after 250
        let model = match_arrows(&store, &[50, 300], &StyleRegistry::new()).unwrap();
        assert!(model.arrows.is_empty());
        assert!(model.misses.is_empty());
    }
}
