//! Outbound robot messages. Each target platform has its own json shape, the
//! [OutboundMessage] enum serializes to exactly one of them.

use serde::{Deserialize, Serialize};

/// size limit of weixin markdown content in bytes
pub const WECHAT_MAX_CONTENT_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
/// body posted to the robot intake url
pub enum OutboundMessage {
	WeChat(WeChatMessage),
	Feishu(FeishuMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// weixin work robot markdown message
pub struct WeChatMessage {
	msgtype: String,
	markdown: WeChatMarkdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WeChatMarkdown {
	content: String,
}

impl WeChatMessage {
	/// Constructs a markdown message. Content exceeding
	/// [WECHAT_MAX_CONTENT_LEN] is truncated at a character boundary because
	/// the robot rejects larger messages.
	pub fn markdown(content: impl Into<String>) -> Self {
		let mut content = content.into();

		if content.len() > WECHAT_MAX_CONTENT_LEN {
			tracing::warn!(
				len = content.len(),
				"weixin markdown content exceeds {WECHAT_MAX_CONTENT_LEN} bytes, truncating"
			);

			let mut end = WECHAT_MAX_CONTENT_LEN;
			while !content.is_char_boundary(end) {
				end -= 1;
			}
			content.truncate(end);
		}

		Self { msgtype: String::from("markdown"), markdown: WeChatMarkdown { content } }
	}

	#[cfg(test)]
	pub fn content(&self) -> &str {
		&self.markdown.content
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// feishu robot rich text ("post") message
pub struct FeishuMessage {
	msg_type: String,
	content: FeishuContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FeishuContent {
	post: FeishuPost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FeishuPost {
	zh_cn: FeishuPostBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FeishuPostBody {
	title: String,
	/// outer: paragraphs, inner: inline spans
	content: Vec<Vec<Span>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// inline element of a feishu paragraph
pub struct Span {
	pub tag: String,
	pub text: String,
}

impl Span {
	pub fn text(text: impl Into<String>) -> Self {
		Self { tag: String::from("text"), text: text.into() }
	}
}

impl FeishuMessage {
	/// # Arguments
	///
	/// * `title` - title shown above the post
	///
	/// * `paragraphs` - paragraphs, each made of inline spans
	pub fn post(title: impl Into<String>, paragraphs: Vec<Vec<Span>>) -> Self {
		Self {
			msg_type: String::from("post"),
			content: FeishuContent {
				post: FeishuPost { zh_cn: FeishuPostBody { title: title.into(), content: paragraphs } },
			},
		}
	}

	#[cfg(test)]
	pub fn title(&self) -> &str {
		&self.content.post.zh_cn.title
	}

	#[cfg(test)]
	pub fn paragraphs(&self) -> &[Vec<Span>] {
		&self.content.post.zh_cn.content
	}

	/// texts of all spans, paragraph by paragraph
	#[cfg(test)]
	pub fn texts(&self) -> impl Iterator<Item = &str> {
		self.paragraphs().iter().flatten().map(|span| span.text.as_str())
	}
}

impl From<WeChatMessage> for OutboundMessage {
	fn from(msg: WeChatMessage) -> Self {
		Self::WeChat(msg)
	}
}

impl From<FeishuMessage> for OutboundMessage {
	fn from(msg: FeishuMessage) -> Self {
		Self::Feishu(msg)
	}
}
