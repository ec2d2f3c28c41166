//! data structures for deserializing gitlab push and merge request hooks
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// separates commits and label change sets in rendered events
const SEPARATOR: &str = "----------------------";

/// a gitlab hook, distinguished by its `object_kind`
#[derive(Clone, Debug)]
pub enum SourceEvent {
	Push(PushEvent),
	Merge(MergeEvent),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct PushEvent {
	pub object_kind: String,
	pub checkout_sha: String,
	pub project: Project,
	pub repository: Repository,
	pub commits: Vec<Commit>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct MergeEvent {
	pub object_kind: String,
	pub user: User,
	pub project: Project,
	pub repository: Repository,
	pub changes: Changes,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Project {
	pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Repository {
	pub name: String,
	pub url: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Commit {
	pub id: String,
	pub title: String,
	pub message: String,
	pub timestamp: Option<DateTime<FixedOffset>>,
	pub url: String,
	pub author: Author,
	pub added: Vec<String>,
	pub modified: Vec<String>,
	pub removed: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Author {
	pub name: String,
	pub email: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct User {
	pub name: String,
	pub username: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Changes {
	pub labels: LabelChanges,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelChanges {
	pub previous: Vec<Label>,
	pub current: Vec<Label>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Label {
	pub id: i64,
	pub title: String,
	pub project_id: Option<i64>,
	pub created_at: String,
	pub updated_at: String,
	pub description: Option<String>,
	#[serde(rename = "type")]
	pub kind: String,
}

/// Renders a push hook as markdown text, one block per commit in the order
/// gitlab sent them.
pub fn format_push_event(event: &PushEvent) -> String {
	let mut msg = String::new();

	msg.push_str(&format!("Project: {}\n", event.project.name));
	msg.push_str(&format!("Repository: [{0}]({0})\n", event.repository.url));
	msg.push_str(&format!("Commit: {}\n", event.checkout_sha));

	for commit in &event.commits {
		msg.push_str(SEPARATOR);
		msg.push('\n');
		msg.push_str(&format!("Title: {}\n", commit.title));
		msg.push_str(&format!("ID: {}\n", commit.id));
		msg.push_str(&format!("Message: {}\n", commit.message));
		match commit.timestamp {
			Some(timestamp) => {
				msg.push_str(&format!("Timestamp: {}\n", timestamp.format("%Y-%m-%d %H:%M:%S %:z")))
			}
			None => msg.push_str("Timestamp: \n"),
		}
		msg.push_str(&format!("URL: [{0}]({0})\n", commit.url));
		msg.push_str(&format!("Author: {}\n", commit.author.name));

		for path in &commit.added {
			msg.push_str(&format!("Added: {path}\n"));
		}
		for path in &commit.modified {
			msg.push_str(&format!("Modified: {path}\n"));
		}
		for path in &commit.removed {
			msg.push_str(&format!("Removed: {path}\n"));
		}
	}

	msg
}

/// Renders a merge request hook as markdown text listing the label changes.
pub fn format_merge_event(event: &MergeEvent) -> String {
	let mut msg = String::new();

	msg.push_str(&format!("Project: {}\n", event.project.name));
	msg.push_str(&format!("Repository: [{0}]({0})\n", event.repository.url));
	msg.push_str(&format!("Kind: {}\n", event.object_kind));
	msg.push_str(&format!("User: {}\n", event.user.username));
	msg.push_str(SEPARATOR);
	msg.push('\n');

	for label in &event.changes.labels.previous {
		push_label(&mut msg, "Previous", label);
	}
	msg.push_str("--\n");
	for label in &event.changes.labels.current {
		push_label(&mut msg, "Current", label);
	}

	msg
}

fn push_label(msg: &mut String, prefix: &str, label: &Label) {
	msg.push_str(&format!("{prefix} ID: {}\n", label.id));
	msg.push_str(&format!("{prefix} Title: {}\n", label.title));
	msg.push_str(&format!("{prefix} ProjectID: {}\n", label.project_id.unwrap_or_default()));
	msg.push_str(&format!("{prefix} CreatedAt: {}\n", label.created_at));
	msg.push_str(&format!("{prefix} UpdatedAt: {}\n", label.updated_at));
	msg.push_str(&format!("{prefix} Description: {}\n", label.description.as_deref().unwrap_or("")));
	msg.push_str(&format!("{prefix} Type: {}\n", label.kind));
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn push_event_lists_commits_in_order() {
		let event: PushEvent = serde_json::from_value(json!({
			"object_kind": "push",
			"checkout_sha": "da1560886d4f094c3e6c9ef40349f7d38b5d27d7",
			"project": { "name": "Diaspora" },
			"repository": { "name": "Diaspora", "url": "git@example.com:mike/diaspora.git" },
			"commits": [
				{
					"id": "b6568db1bc1dcd7f8b4d5a946b0b91f9dacd7327",
					"title": "Update Catalan translation",
					"message": "Update Catalan translation to e38cb41.",
					"timestamp": "2011-12-12T14:27:31+02:00",
					"url": "http://example.com/mike/diaspora/commit/b6568db1",
					"author": { "name": "Jordi Mallach", "email": "jordi@softcatala.org" },
					"added": ["CHANGELOG"],
					"modified": ["app/controller/application.rb"],
					"removed": []
				},
				{
					"id": "da1560886d4f094c3e6c9ef40349f7d38b5d27d7",
					"title": "fixed readme",
					"message": "fixed readme",
					"timestamp": "2012-01-03T23:36:29+02:00",
					"url": "http://example.com/mike/diaspora/commit/da156088",
					"author": { "name": "GitLab dev user", "email": "gitlabdev@dv6700.(none)" },
					"removed": ["README.old"]
				}
			]
		}))
		.unwrap();

		let text = format_push_event(&event);
		let lines: Vec<&str> = text.lines().collect();

		assert_eq!(lines[0], "Project: Diaspora");
		assert_eq!(
			lines[1],
			"Repository: [git@example.com:mike/diaspora.git](git@example.com:mike/diaspora.git)"
		);
		assert_eq!(lines[2], "Commit: da1560886d4f094c3e6c9ef40349f7d38b5d27d7");
		assert_eq!(lines.iter().filter(|line| **line == SEPARATOR).count(), 2);
		assert!(lines.contains(&"Timestamp: 2011-12-12 14:27:31 +02:00"));
		assert!(lines.contains(&"Added: CHANGELOG"));
		assert!(lines.contains(&"Modified: app/controller/application.rb"));
		assert!(lines.contains(&"Removed: README.old"));

		let first = text.find("Title: Update Catalan translation").unwrap();
		let second = text.find("Title: fixed readme").unwrap();
		assert!(first < second);
	}

	#[test]
	fn merge_event_lists_previous_before_current_labels() {
		let event: MergeEvent = serde_json::from_value(json!({
			"object_kind": "merge_request",
			"user": { "name": "Administrator", "username": "root" },
			"project": { "name": "Gitlab Test" },
			"repository": { "url": "http://example.com/gitlabhq/gitlab-test.git" },
			"changes": {
				"labels": {
					"previous": [{
						"id": 206,
						"title": "API",
						"project_id": 14,
						"created_at": "2013-12-03T17:15:43Z",
						"updated_at": "2013-12-03T17:15:43Z",
						"description": "API related issues",
						"type": "ProjectLabel"
					}],
					"current": [{
						"id": 205,
						"title": "Platform",
						"project_id": 14,
						"created_at": "2013-12-03T17:15:43Z",
						"updated_at": "2013-12-03T17:15:43Z",
						"description": null,
						"type": "ProjectLabel"
					}]
				}
			}
		}))
		.unwrap();

		let text = format_merge_event(&event);

		assert!(text.starts_with("Project: Gitlab Test\n"));
		assert!(text.contains("Kind: merge_request\n"));
		assert!(text.contains("User: root\n"));
		assert!(text.contains("Previous Title: API\n"));
		assert!(text.contains("Current Description: \n"));

		let previous = text.find("Previous ID: 206").unwrap();
		let divider = text.find("\n--\n").unwrap();
		let current = text.find("Current ID: 205").unwrap();
		assert!(previous < divider && divider < current);
	}

	#[test]
	fn empty_merge_event_keeps_dividers() {
		let text = format_merge_event(&MergeEvent::default());

		assert_eq!(text, format!("Project: \nRepository: []()\nKind: \nUser: \n{SEPARATOR}\n--\n"));
	}
}
