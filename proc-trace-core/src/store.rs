//! Interval store
//!
//! Per-attribute ordered, non-overlapping intervals written by a single
//! producer and read concurrently by any number of views. Readers only ever
//! observe data committed up to [`IntervalStore::current_end_time`]; the
//! value an attribute holds "right now" is exposed as an ongoing interval
//! ending at that time.

use crate::attributes::AttributeTree;
use crate::monitor::ProgressMonitor;
use crate::types::{interval_at, AttributeId, Interval, Result, Timestamp, TraceError, Value};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Granularity used when a wait must also watch a cancellation token
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Building,
    Built,
    Disposed,
}

/// Interval history of a single attribute
#[derive(Debug, Default)]
struct History {
    /// Closed intervals, contiguous and ordered by start time
    closed: Vec<Interval>,
    /// Start and value of the interval still being written
    ongoing: Option<(Timestamp, Value)>,
}

impl History {
    fn ongoing_interval(&self, attribute: AttributeId, end: Timestamp) -> Option<Interval> {
        self.ongoing
            .as_ref()
            .filter(|(start, _)| *start <= end)
            .map(|(start, value)| Interval::new(attribute, *start, end, value.clone()))
    }

    fn at(&self, attribute: AttributeId, time: Timestamp, end: Timestamp) -> Option<Interval> {
        interval_at(&self.closed, time)
            .cloned()
            .or_else(|| self.ongoing_interval(attribute, end).filter(|i| i.intersects(time)))
    }

    /// Intervals ending at or after `from`, the ongoing one last
    fn intervals_from(
        &self,
        attribute: AttributeId,
        from: Timestamp,
        end: Timestamp,
    ) -> impl Iterator<Item = Interval> + '_ {
        let first = self.closed.partition_point(|interval| interval.end < from);
        let ongoing = self
            .ongoing_interval(attribute, end)
            .filter(|interval| interval.end >= from);
        self.closed[first..].iter().cloned().chain(ongoing)
    }
}

#[derive(Debug)]
struct StoreInner {
    tree: AttributeTree,
    /// Indexed by attribute id
    histories: Vec<History>,
    start_time: Timestamp,
    current_end: Timestamp,
}

impl StoreInner {
    fn history(&self, attribute: AttributeId) -> Result<&History> {
        self.histories
            .get(attribute.index())
            .ok_or(TraceError::UnknownAttribute(attribute))
    }
}

/// The hierarchical time-interval attribute store
///
/// Share it behind an `Arc`: the writer appends through `&self` while views
/// query it from other threads.
#[derive(Debug)]
pub struct IntervalStore {
    trace_name: String,
    inner: RwLock<StoreInner>,
    state: Mutex<BuildState>,
    state_changed: Condvar,
}

impl IntervalStore {
    /// Create an empty store whose history begins at `start_time`
    pub fn new(trace_name: impl Into<String>, start_time: Timestamp) -> Self {
        let trace_name = trace_name.into();
        log::info!("Creating interval store for trace '{}' at {}", trace_name, start_time);
        Self {
            trace_name,
            inner: RwLock::new(StoreInner {
                tree: AttributeTree::new(),
                histories: vec![History::default()],
                start_time,
                current_end: start_time,
            }),
            state: Mutex::new(BuildState::Building),
            state_changed: Condvar::new(),
        }
    }

    pub fn trace_name(&self) -> &str {
        &self.trace_name
    }

    fn ensure_live(&self) -> Result<()> {
        match *self.state.lock() {
            BuildState::Disposed => Err(TraceError::Disposed),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Writer side
    // ------------------------------------------------------------------

    /// Get the attribute for `path`, adding it (and its ancestors) if needed
    ///
    /// New attributes hold [`Value::Absent`] from the store's start time.
    pub fn attribute_or_add<S: AsRef<str>>(&self, path: &[S]) -> Result<AttributeId> {
        self.ensure_live()?;
        let mut inner = self.inner.write();
        let attribute = inner.tree.get_or_add(path)?;
        let start_time = inner.start_time;
        while inner.histories.len() < inner.tree.len() {
            inner.histories.push(History {
                closed: Vec::new(),
                ongoing: Some((start_time, Value::Absent)),
            });
        }
        Ok(attribute)
    }

    /// Record that `attribute` holds `value` from `time` onwards
    ///
    /// The previous value is closed at `time - 1`. Setting the value it
    /// already holds is a no-op.
    pub fn modify_attribute(
        &self,
        time: Timestamp,
        value: Value,
        attribute: AttributeId,
    ) -> Result<()> {
        self.ensure_live()?;
        let mut inner = self.inner.write();
        if time < inner.start_time {
            return Err(TraceError::OutOfOrder {
                attribute,
                time,
                last: inner.start_time,
            });
        }
        let history = inner
            .histories
            .get_mut(attribute.index())
            .filter(|_| attribute != AttributeId::ROOT)
            .ok_or(TraceError::UnknownAttribute(attribute))?;

        match history.ongoing.take() {
            Some((start, previous)) if time < start => {
                history.ongoing = Some((start, previous));
                return Err(TraceError::OutOfOrder {
                    attribute,
                    time,
                    last: start,
                });
            }
            Some((start, previous)) if previous == value => {
                history.ongoing = Some((start, previous));
            }
            Some((start, _)) if time == start => {
                history.ongoing = Some((start, value));
            }
            Some((start, previous)) => {
                history.closed.push(Interval::new(attribute, start, time - 1, previous));
                history.ongoing = Some((time, value));
            }
            None => {
                return Err(TraceError::InvalidData(format!(
                    "attribute {} history is already closed",
                    attribute
                )));
            }
        }
        inner.current_end = inner.current_end.max(time);
        Ok(())
    }

    /// Advance the committed end time without changing any value
    pub fn update_end_time(&self, time: Timestamp) {
        let mut inner = self.inner.write();
        inner.current_end = inner.current_end.max(time);
    }

    /// Close every ongoing interval at `end_time` and mark the store built
    pub fn close_history(&self, end_time: Timestamp) -> Result<()> {
        self.ensure_live()?;
        {
            let mut inner = self.inner.write();
            if end_time < inner.current_end {
                return Err(TraceError::TimeRange {
                    start: inner.current_end,
                    end: end_time,
                });
            }
            inner.current_end = end_time;
            for (idx, history) in inner.histories.iter_mut().enumerate().skip(1) {
                if let Some((start, value)) = history.ongoing.take() {
                    let attribute = AttributeId(idx as u32);
                    history.closed.push(Interval::new(attribute, start, end_time, value));
                }
            }
            log::info!(
                "Interval store '{}' built: {} attributes, end time {}",
                self.trace_name,
                inner.tree.len() - 1,
                end_time
            );
        }
        self.set_state(BuildState::Built);
        Ok(())
    }

    /// Release the store; every later query fails with [`TraceError::Disposed`]
    pub fn dispose(&self) {
        log::debug!("Disposing interval store '{}'", self.trace_name);
        self.set_state(BuildState::Disposed);
    }

    fn set_state(&self, new_state: BuildState) {
        let mut state = self.state.lock();
        if *state != BuildState::Disposed {
            *state = new_state;
        }
        self.state_changed.notify_all();
    }

    // ------------------------------------------------------------------
    // Reader side
    // ------------------------------------------------------------------

    /// True once the writer closed the history
    pub fn is_built(&self) -> bool {
        *self.state.lock() == BuildState::Built
    }

    pub fn is_disposed(&self) -> bool {
        *self.state.lock() == BuildState::Disposed
    }

    pub fn start_time(&self) -> Timestamp {
        self.inner.read().start_time
    }

    /// Latest committed time; queries past it find nothing
    pub fn current_end_time(&self) -> Timestamp {
        self.inner.read().current_end
    }

    /// Block until the store is built, disposed, or `timeout` elapses
    ///
    /// Returns true only if the store is built. `None` waits indefinitely.
    pub fn wait_until_built(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while *state == BuildState::Building {
            match deadline {
                Some(deadline) => {
                    if self.state_changed.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.state_changed.wait(&mut state),
            }
        }
        *state == BuildState::Built
    }

    /// Like [`wait_until_built`](Self::wait_until_built), also giving up
    /// when `monitor` is cancelled
    pub fn wait_until_built_cancellable(
        &self,
        timeout: Option<Duration>,
        monitor: &ProgressMonitor,
    ) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if monitor.is_cancelled() {
                return self.is_built();
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return self.is_built();
                    }
                    CANCEL_POLL_INTERVAL.min(deadline - now)
                }
                None => CANCEL_POLL_INTERVAL,
            };
            let mut state = self.state.lock();
            if *state == BuildState::Building {
                self.state_changed.wait_for(&mut state, slice);
            }
            if *state != BuildState::Building {
                return *state == BuildState::Built;
            }
        }
    }

    /// Run `f` against the attribute tree
    pub fn with_tree<R>(&self, f: impl FnOnce(&AttributeTree) -> R) -> Result<R> {
        self.ensure_live()?;
        Ok(f(&self.inner.read().tree))
    }

    /// Resolve a path pattern; see [`AttributeTree::resolve`]
    pub fn resolve<S: AsRef<str>>(&self, pattern: &[S]) -> Result<Vec<AttributeId>> {
        self.with_tree(|tree| tree.resolve(pattern))
    }

    pub fn opt_attribute<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<AttributeId>> {
        self.with_tree(|tree| tree.opt_attribute(path))
    }

    pub fn opt_attribute_relative<S: AsRef<str>>(
        &self,
        start: AttributeId,
        path: &[S],
    ) -> Result<Option<AttributeId>> {
        self.with_tree(|tree| tree.opt_attribute_relative(start, path))
    }

    pub fn children_of(&self, attribute: AttributeId) -> Result<Vec<AttributeId>> {
        self.with_tree(|tree| tree.children_of(attribute).map(<[_]>::to_vec))?
    }

    pub fn name_of(&self, attribute: AttributeId) -> Result<String> {
        self.with_tree(|tree| tree.name_of(attribute).map(str::to_string))?
    }

    /// The interval of `attribute` containing `time`
    ///
    /// `Ok(None)` when `time` precedes the store start or lies past the
    /// committed end time.
    pub fn point_query(&self, attribute: AttributeId, time: Timestamp) -> Result<Option<Interval>> {
        self.point_query_with_end(attribute, time)
            .map(|(interval, _)| interval)
    }

    /// [`point_query`](Self::point_query) together with the committed end
    /// time it was answered against
    pub fn point_query_with_end(
        &self,
        attribute: AttributeId,
        time: Timestamp,
    ) -> Result<(Option<Interval>, Timestamp)> {
        self.ensure_live()?;
        let inner = self.inner.read();
        let history = inner.history(attribute)?;
        let end = inner.current_end;
        if time < inner.start_time || time > end {
            return Ok((None, end));
        }
        Ok((history.at(attribute, time, end), end))
    }

    /// Every interval of each attribute that contains at least one of `times`
    ///
    /// One sweep per attribute over its history rather than one floor
    /// search per timestamp. Times past the committed end are ignored.
    pub fn range_query(
        &self,
        attributes: &[AttributeId],
        times: &[Timestamp],
    ) -> Result<BTreeMap<AttributeId, Vec<Interval>>> {
        self.ensure_live()?;
        let inner = self.inner.read();

        let mut sorted: Vec<Timestamp> = times
            .iter()
            .copied()
            .filter(|t| *t >= inner.start_time && *t <= inner.current_end)
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut result = BTreeMap::new();
        for &attribute in attributes {
            let history = inner.history(attribute)?;
            let mut found = Vec::new();
            if let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) {
                let mut next_time = 0;
                for interval in history.intervals_from(attribute, first, inner.current_end) {
                    if interval.start > last {
                        break;
                    }
                    while next_time < sorted.len() && sorted[next_time] < interval.start {
                        next_time += 1;
                    }
                    match sorted.get(next_time) {
                        Some(&t) if t <= interval.end => found.push(interval),
                        Some(_) => {}
                        None => break,
                    }
                }
            }
            result.insert(attribute, found);
        }
        log::debug!(
            "Range query: {} attributes, {} timestamps, {} intervals",
            attributes.len(),
            sorted.len(),
            result.values().map(Vec::len).sum::<usize>()
        );
        Ok(result)
    }

    /// Every interval of each attribute overlapping `[start, end]`
    pub fn range_query_span(
        &self,
        attributes: &[AttributeId],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<BTreeMap<AttributeId, Vec<Interval>>> {
        if start > end {
            return Err(TraceError::TimeRange { start, end });
        }
        self.ensure_live()?;
        let inner = self.inner.read();
        let end = end.min(inner.current_end);

        let mut result = BTreeMap::new();
        for &attribute in attributes {
            let history = inner.history(attribute)?;
            let found: Vec<Interval> = history
                .intervals_from(attribute, start, inner.current_end)
                .take_while(|interval| interval.start <= end)
                .filter(|interval| interval.overlaps(start, end))
                .collect();
            result.insert(attribute, found);
        }
        Ok(result)
    }
}
