//! Tier model: ordered override levels, coordinates and tier paths
//!
//! Tiers are ordered from the most general (rank 0) to the most specific.
//! A [`TierPath`] holds one [`Coord`] per tier from the most general tier down
//! to the tier it addresses, so its length determines its tier.

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

use crate::prelude::*;

pub const WILDCARD: &str = "*";

// TierRank //
//**********//
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TierRank(pub u8);

impl TierRank {
	pub fn index(self) -> usize {
		usize::from(self.0)
	}
}

impl fmt::Display for TierRank {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

// Tiers //
//*******//
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierDef {
	pub name: Box<str>,
	/// Whether an override at this tier may be locked
	pub can_lock: bool,
}

impl TierDef {
	pub fn new(name: impl Into<Box<str>>, can_lock: bool) -> Self {
		Self { name: name.into(), can_lock }
	}
}

/// The ordered tier list, fixed at construction time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tiers {
	tiers: Box<[TierDef]>,
}

impl Tiers {
	pub fn new(tiers: impl IntoIterator<Item = TierDef>) -> StResult<Self> {
		let tiers: Box<[TierDef]> = tiers.into_iter().collect();
		if tiers.len() < 2 {
			return Err(Error::ConfigError("at least two tiers are required".into()));
		}
		if tiers.len() > usize::from(u8::MAX) {
			return Err(Error::ConfigError("too many tiers".into()));
		}
		for (i, tier) in tiers.iter().enumerate() {
			if tier.name.trim().is_empty() {
				return Err(Error::ConfigError(format!("tier #{} has an empty name", i)));
			}
			if tiers[..i].iter().any(|t| t.name.eq_ignore_ascii_case(&tier.name)) {
				return Err(Error::ConfigError(format!("duplicate tier name '{}'", tier.name)));
			}
		}
		Ok(Self { tiers })
	}

	/// Developer < Provider < Distributor < Workspace < User
	pub fn standard() -> Self {
		Self {
			tiers: Box::new([
				TierDef::new("Developer", true),
				TierDef::new("Provider", true),
				TierDef::new("Distributor", true),
				TierDef::new("Workspace", true),
				TierDef::new("User", false),
			]),
		}
	}

	/// System < Workspace < User
	pub fn simple() -> Self {
		Self {
			tiers: Box::new([
				TierDef::new("System", true),
				TierDef::new("Workspace", true),
				TierDef::new("User", false),
			]),
		}
	}

	/// Parse a comma separated tier list, general first.
	/// Every tier except the most specific one may lock.
	pub fn parse(list: &str) -> StResult<Self> {
		let names: Vec<&str> = list.split(',').map(str::trim).collect();
		let last = names.len().saturating_sub(1);
		Self::new(names.into_iter().enumerate().map(|(i, name)| TierDef::new(name, i < last)))
	}

	pub fn len(&self) -> usize {
		self.tiers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tiers.is_empty()
	}

	pub fn get(&self, rank: TierRank) -> Option<&TierDef> {
		self.tiers.get(rank.index())
	}

	pub fn name(&self, rank: TierRank) -> &str {
		self.get(rank).map_or("?", |t| &t.name)
	}

	pub fn rank(&self, name: &str) -> Option<TierRank> {
		self.tiers
			.iter()
			.position(|t| t.name.eq_ignore_ascii_case(name))
			.and_then(|i| u8::try_from(i).ok())
			.map(TierRank)
	}

	pub fn most_specific(&self) -> TierRank {
		TierRank(u8::try_from(self.tiers.len().saturating_sub(1)).unwrap_or(u8::MAX))
	}

	pub fn iter(&self) -> impl Iterator<Item = (TierRank, &TierDef)> {
		self.tiers.iter().zip(0u8..).map(|(def, i)| (TierRank(i), def))
	}

	pub fn can_lock(&self, rank: TierRank) -> bool {
		self.get(rank).is_some_and(|t| t.can_lock)
	}

	/// Reject paths that address a tier this list does not have
	pub fn validate_path(&self, path: &TierPath) -> StResult<()> {
		if path.len() > self.tiers.len() {
			return Err(Error::ValidationError(format!(
				"tier path {} has {} coordinates but only {} tiers are configured",
				path,
				path.len(),
				self.tiers.len()
			)));
		}
		Ok(())
	}
}

// Coord //
//*******//
/// One coordinate of a tier path: a concrete id or the `*` wildcard
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Coord {
	Any,
	Id(Box<str>),
}

impl Coord {
	pub fn parse(s: &str) -> Self {
		let s = s.trim();
		if s.is_empty() || s == WILDCARD { Coord::Any } else { Coord::Id(s.into()) }
	}

	pub fn id(id: impl Into<Box<str>>) -> Self {
		Coord::Id(id.into())
	}

	pub fn is_concrete(&self) -> bool {
		matches!(self, Coord::Id(_))
	}

	pub fn as_str(&self) -> &str {
		match self {
			Coord::Any => WILDCARD,
			Coord::Id(id) => id,
		}
	}

	/// A record coordinate matches a context coordinate if it is the wildcard
	/// or names the same id
	pub fn matches(&self, context: &Coord) -> bool {
		match self {
			Coord::Any => true,
			Coord::Id(_) => self == context,
		}
	}
}

impl fmt::Display for Coord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<Option<&str>> for Coord {
	fn from(id: Option<&str>) -> Self {
		id.map_or(Coord::Any, Coord::parse)
	}
}

impl Serialize for Coord {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Coord {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Coord::parse(&String::deserialize(deserializer)?))
	}
}

// TierPath //
//**********//
/// Coordinates from the most general tier down to the tier the path addresses
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierPath(Box<[Coord]>);

impl TierPath {
	pub fn new(coords: impl IntoIterator<Item = Coord>) -> StResult<Self> {
		let coords: Box<[Coord]> = coords.into_iter().collect();
		if coords.is_empty() {
			return Err(Error::ValidationError("tier path cannot be empty".into()));
		}
		if coords.len() > usize::from(u8::MAX) {
			return Err(Error::ValidationError("tier path is too long".into()));
		}
		Ok(Self(coords))
	}

	/// Build from optional ids, `None` and `"*"` meaning wildcard
	pub fn from_ids<'a>(ids: impl IntoIterator<Item = Option<&'a str>>) -> StResult<Self> {
		Self::new(ids.into_iter().map(Coord::from))
	}

	/// Parse string coordinates as stored by adapters
	pub fn from_strings<S: AsRef<str>>(coords: &[S]) -> StResult<Self> {
		Self::new(coords.iter().map(|c| Coord::parse(c.as_ref())))
	}

	/// Wildcard path addressing `tier`
	pub fn wildcard(tier: TierRank) -> Self {
		Self(vec![Coord::Any; tier.index() + 1].into_boxed_slice())
	}

	pub fn coords(&self) -> &[Coord] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// The tier this path addresses
	pub fn tier(&self) -> TierRank {
		TierRank(u8::try_from(self.0.len().saturating_sub(1)).unwrap_or(u8::MAX))
	}

	pub fn get(&self, tier: TierRank) -> Option<&Coord> {
		self.0.get(tier.index())
	}

	/// Truncate to a more general tier; `None` if `tier` is more specific than the path
	pub fn prefix(&self, tier: TierRank) -> Option<TierPath> {
		(tier.index() < self.0.len()).then(|| TierPath(self.0[..=tier.index()].into()))
	}

	/// Whether a record stored at `self` takes part in resolution for `context`
	pub fn applies_to(&self, context: &TierPath) -> bool {
		self.0.len() <= context.0.len()
			&& self.0.iter().zip(context.0.iter()).all(|(rec, ctx)| rec.matches(ctx))
	}

	/// Orders two paths of the same tier by how specifically they address it:
	/// a concrete coordinate at the path's own tier beats a wildcard, then more
	/// concrete coordinates win.
	pub fn cmp_specificity(&self, other: &TierPath) -> Ordering {
		let own = |p: &TierPath| p.0.last().is_some_and(Coord::is_concrete);
		let concrete = |p: &TierPath| p.0.iter().filter(|c| c.is_concrete()).count();
		own(self).cmp(&own(other)).then_with(|| concrete(self).cmp(&concrete(other)))
	}

	pub fn to_strings(&self) -> Vec<String> {
		self.0.iter().map(|c| c.as_str().to_string()).collect()
	}
}

impl fmt::Display for TierPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[")?;
		for (i, coord) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{}", coord)?;
		}
		write!(f, "]")
	}
}


// vim: ts=4
