//! Deterministic exclusion denylist.
//!
//! A second guard after classification: anything whose category or title
//! names a vehicle, real estate, a firearm, bullion or coins, or heavy
//! equipment is excluded even if the classifier allowed it.

use regex::Regex;
use std::sync::LazyLock;

const DENYLIST: &[&str] = &[
    // Vehicles
    "vehicle", "vehicles", "automobile", "automobiles", "motorcycle", "motorcycles",
    "pickup truck", "box truck", "semi truck", "atv", "utv", "boat", "boats",
    "jet ski", "golf cart", "rv", "camper", "travel trailer", "utility trailer",
    "snowmobile", "vin",
    // Real estate
    "real estate", "acreage", "acres", "vacant land", "land parcel", "timeshare",
    "property deed", "residential property", "commercial property",
    // Firearms
    "firearm", "firearms", "rifle", "rifles", "shotgun", "shotguns", "pistol",
    "pistols", "handgun", "handguns", "revolver", "ammunition", "ammo",
    // Bullion and coins
    "bullion", "gold bar", "silver bar", "gold bars", "silver bars", "coin", "coins",
    "numismatic", "numismatics",
    // Heavy, farm and industrial equipment
    "tractor", "tractors", "forklift", "forklifts", "excavator", "skid steer",
    "bulldozer", "backhoe", "wheel loader", "combine harvester", "farm equipment",
    "heavy equipment", "industrial equipment", "construction equipment",
];

static DENYLIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = DENYLIST.iter().map(|k| regex::escape(k)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
});

/// First denylisted keyword found in the category, then the title.
pub fn denylisted_keyword(category: &str, title: &str) -> Option<String> {
    [category, title]
        .iter()
        .find_map(|text| DENYLIST_PATTERN.find(text))
        .map(|m| m.as_str().to_lowercase())
}
