//! Well-known command types and the payload fields their handlers expect.
//!
//! The engine treats `type` as opaque; this table only helps producers
//! write commands that the stock handlers understand.

use crate::queue::Payload;

/// Description of a well-known command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
	pub name: &'static str,
	pub platform: &'static str,
	/// Payload fields the handler reads.
	pub fields: &'static [&'static str],
	pub summary: &'static str,
}

pub const KNOWN_KINDS: &[KindInfo] = &[
	KindInfo {
		name: "x_login",
		platform: "x",
		fields: &["username", "password"],
		summary: "Log into X and keep the page for later X commands",
	},
	KindInfo {
		name: "x_post",
		platform: "x",
		fields: &["content"],
		summary: "Publish a post",
	},
	KindInfo {
		name: "x_follow",
		platform: "x",
		fields: &["username"],
		summary: "Follow an account",
	},
	KindInfo {
		name: "x_comment",
		platform: "x",
		fields: &["url", "comment"],
		summary: "Reply to a post",
	},
	KindInfo {
		name: "x_update_profile",
		platform: "x",
		fields: &["updates"],
		summary: "Update display name, bio, location or website",
	},
	KindInfo {
		name: "x_like_retweet",
		platform: "x",
		fields: &["url"],
		summary: "Like and repost a post",
	},
	KindInfo {
		name: "youtube_comment",
		platform: "youtube",
		fields: &["videoUrl", "comment"],
		summary: "Comment on a video",
	},
	KindInfo {
		name: "youtube_reply",
		platform: "youtube",
		fields: &["videoUrl", "commentText", "reply"],
		summary: "Reply to the first comment containing `commentText`",
	},
	KindInfo {
		name: "youtube_channel_info",
		platform: "youtube",
		fields: &[],
		summary: "Capture channel screenshot, subscriber and video counts",
	},
	KindInfo {
		name: "screenshot",
		platform: "web",
		fields: &["url", "filename"],
		summary: "Full-page screenshot into the artifacts directory",
	},
];

/// Looks up a well-known command type by name.
pub fn lookup(name: &str) -> Option<&'static KindInfo> {
	KNOWN_KINDS.iter().find(|info| info.name == name)
}

/// Returns the expected fields of `kind` that are absent from `payload`.
///
/// Unknown kinds have no expectations and always return an empty list.
pub fn missing_fields(kind: &str, payload: &Payload) -> Vec<&'static str> {
	lookup(kind)
		.map(|info| info.fields.iter().copied().filter(|field| !payload.contains_key(*field)).collect())
		.unwrap_or_default()
}
