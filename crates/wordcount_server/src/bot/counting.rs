#![forbid(unsafe_code)]

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use wordcount_domain::{ChannelName, CountEvent, format_duration, normalize_word, parse_integer_token};

/// Initial settings of a channel that is tracked for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDefaults {
	pub period: i64,
	pub min_int: Option<i64>,
	pub max_int: Option<i64>,
	pub result_limit: Option<usize>,
}

/// Counting state of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
	/// Window length in seconds.
	pub period: i64,
	pub min_int: Option<i64>,
	pub max_int: Option<i64>,
	pub result_limit: Option<usize>,
	events: VecDeque<CountEvent>,
}

impl ChannelState {
	pub fn new(defaults: ChannelDefaults) -> Self {
		Self {
			period: defaults.period,
			min_int: defaults.min_int,
			max_int: defaults.max_int,
			result_limit: defaults.result_limit,
			events: VecDeque::new(),
		}
	}

	/// Build from persisted parts; `events` must already be valid and time ordered.
	pub fn from_parts(defaults: ChannelDefaults, events: Vec<CountEvent>) -> Self {
		Self {
			events: events.into(),
			..Self::new(defaults)
		}
	}

	pub fn events(&self) -> impl DoubleEndedIterator<Item = &CountEvent> + ExactSizeIterator {
		self.events.iter()
	}

	pub fn len(&self) -> usize {
		self.events.len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}

	/// Oldest timestamp still inside the window.
	pub fn cutoff(&self, now: i64) -> i64 {
		now.saturating_sub(self.period)
	}

	/// Append an already normalized event. A timestamp older than the newest
	/// stored one is raised to it so the log stays ordered.
	pub fn push(&mut self, mut event: CountEvent) -> bool {
		if !event.is_valid() {
			return false;
		}
		if let Some(last) = self.events.back() {
			event.timestamp = event.timestamp.max(last.timestamp);
		}
		self.events.push_back(event);
		true
	}

	/// Events inside the window, newest first.
	fn window(&self, now: i64) -> impl Iterator<Item = &CountEvent> {
		let cutoff = self.cutoff(now);
		self.events.iter().rev().take_while(move |e| e.timestamp >= cutoff)
	}

	/// Count distinct users per word. An empty `words` counts every word;
	/// otherwise matching is by normalized form and the report is keyed by
	/// the requested spelling.
	pub fn count_words(&self, words: &[&str], now: i64) -> CountReport<String> {
		if words.is_empty() {
			return CountReport::from_counts(tally(self.window(now), |e| Some(e.word.clone())));
		}

		let wanted: HashSet<String> = words.iter().map(|w| normalize_word(w)).collect();
		let counts = tally(self.window(now), |e| wanted.contains(&e.word).then(|| e.word.clone()));

		let mut seen = HashSet::new();
		let entries = words
			.iter()
			.filter(|w| seen.insert(**w))
			.map(|w| {
				let count = counts.get(&normalize_word(w)).copied().unwrap_or(0);
				(w.to_string(), count)
			})
			.collect();
		CountReport::new(entries)
	}

	/// Count distinct users per integer value within the inclusive bounds;
	/// unset bounds fall back to the channel's configured bounds.
	pub fn count_integers(&self, min: Option<i64>, max: Option<i64>, now: i64) -> CountReport<i64> {
		let min = min.or(self.min_int);
		let max = max.or(self.max_int);
		CountReport::from_counts(tally(self.window(now), |e| {
			parse_integer_token(&e.word)
				.filter(|v| min.is_none_or(|m| *v >= m))
				.filter(|v| max.is_none_or(|m| *v <= m))
		}))
	}

	/// Count distinct users per token that is exactly one character long.
	pub fn count_single_characters(&self, now: i64) -> CountReport<String> {
		CountReport::from_counts(tally(self.window(now), |e| {
			let mut chars = e.word.chars();
			(chars.next().is_some() && chars.next().is_none()).then(|| e.word.clone())
		}))
	}

	/// Remove every event; returns the number removed.
	pub fn clear(&mut self) -> usize {
		let removed = self.events.len();
		self.events.clear();
		removed
	}

	/// Remove events older than the window; the event at the cutoff stays.
	pub fn trim(&mut self, now: i64) -> usize {
		let cutoff = self.cutoff(now);
		let first_kept = self.events.partition_point(|e| e.timestamp < cutoff);
		self.events.drain(..first_kept);
		first_kept
	}
}

/// Count distinct users per key produced by `key_of`; `None` skips the event.
fn tally<'a, K, I, F>(events: I, mut key_of: F) -> HashMap<K, usize>
where
	K: Eq + Hash + Clone,
	I: Iterator<Item = &'a CountEvent>,
	F: FnMut(&CountEvent) -> Option<K>,
{
	let mut seen: HashSet<(&str, K)> = HashSet::new();
	let mut counts = HashMap::new();
	for event in events {
		let Some(key) = key_of(event) else {
			continue;
		};
		if seen.insert((event.user.as_str(), key.clone())) {
			*counts.entry(key).or_insert(0) += 1;
		}
	}
	counts
}

/// Query result sorted by descending count, then ascending key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountReport<K> {
	entries: Vec<(K, usize)>,
}

impl<K: Ord> CountReport<K> {
	pub fn new(mut entries: Vec<(K, usize)>) -> Self {
		entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		Self { entries }
	}

	fn from_counts(counts: HashMap<K, usize>) -> Self {
		Self::new(counts.into_iter().collect())
	}

	#[cfg(test)]
	pub fn entries(&self) -> &[(K, usize)] {
		&self.entries
	}

	pub fn truncate(&mut self, limit: usize) {
		self.entries.truncate(limit);
	}

	#[cfg(test)]
	pub fn get<Q>(&self, key: &Q) -> Option<usize>
	where
		K: std::borrow::Borrow<Q>,
		Q: Eq + ?Sized,
	{
		self.entries.iter().find(|(k, _)| k.borrow() == key).map(|(_, c)| *c)
	}
}

impl<K: fmt::Display> CountReport<K> {
	/// Reply text for a window of `period` seconds.
	pub fn render(&self, period: i64) -> String {
		let period = format_duration(period);
		if self.entries.is_empty() {
			return format!("No words counted in the last {period}.");
		}

		let body = self
			.entries
			.iter()
			.map(|(key, count)| format!("{key}: {count}"))
			.collect::<Vec<_>>()
			.join(", ");
		format!("Word-counts within the last {period}: {body}")
	}
}

/// Per-channel counting state, keyed by channel.
#[derive(Debug, Clone, Default)]
pub struct CountStore {
	channels: BTreeMap<ChannelName, ChannelState>,
}

impl CountStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// State of `channel`, created with `defaults` when not tracked yet.
	pub fn get_or_create(&mut self, channel: &ChannelName, defaults: ChannelDefaults) -> &mut ChannelState {
		match self.channels.entry(channel.clone()) {
			Entry::Occupied(e) => e.into_mut(),
			Entry::Vacant(e) => e.insert(ChannelState::new(defaults)),
		}
	}

	#[cfg(test)]
	pub fn get(&self, channel: &ChannelName) -> Option<&ChannelState> {
		self.channels.get(channel)
	}

	pub fn insert(&mut self, channel: ChannelName, state: ChannelState) {
		self.channels.insert(channel, state);
	}

	pub fn remove(&mut self, channel: &ChannelName) -> Option<ChannelState> {
		self.channels.remove(channel)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&ChannelName, &ChannelState)> {
		self.channels.iter()
	}

	pub fn has_events(&self) -> bool {
		self.channels.values().any(|c| !c.is_empty())
	}

	/// Append one use of `word` (normalized here) by `user`.
	pub fn record(
		&mut self,
		channel: &ChannelName,
		defaults: ChannelDefaults,
		user: &str,
		word: &str,
		now: i64,
	) -> bool {
		self.get_or_create(channel, defaults)
			.push(CountEvent::new(user, normalize_word(word), now))
	}

	pub fn count_words(
		&mut self,
		channel: &ChannelName,
		defaults: ChannelDefaults,
		words: &[&str],
		now: i64,
	) -> CountReport<String> {
		self.get_or_create(channel, defaults).count_words(words, now)
	}

	pub fn count_integers(
		&mut self,
		channel: &ChannelName,
		defaults: ChannelDefaults,
		min: Option<i64>,
		max: Option<i64>,
		now: i64,
	) -> CountReport<i64> {
		self.get_or_create(channel, defaults).count_integers(min, max, now)
	}

	pub fn count_single_characters(
		&mut self,
		channel: &ChannelName,
		defaults: ChannelDefaults,
		now: i64,
	) -> CountReport<String> {
		self.get_or_create(channel, defaults).count_single_characters(now)
	}

	pub fn clear(&mut self, channel: &ChannelName) -> usize {
		self.channels.get_mut(channel).map_or(0, ChannelState::clear)
	}

	/// Trim every channel to its window. With `drop_unjoined`, channels for
	/// which `is_joined` is false are dropped whole. Returns rows removed.
	pub fn sweep(&mut self, now: i64, drop_unjoined: bool, is_joined: impl Fn(&ChannelName) -> bool) -> usize {
		let mut removed = 0;
		self.channels.retain(|channel, state| {
			if drop_unjoined && !is_joined(channel) {
				removed += state.len();
				false
			} else {
				removed += state.trim(now);
				true
			}
		});
		removed
	}
}
