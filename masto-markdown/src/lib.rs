use masto_msg::{MediaAttachment, Post};
use masto_threads::Thread;
use pulldown_cmark::{CowStr, Event, HeadingLevel, LinkType, Tag};
use pulldown_cmark_to_cmark::cmark;
use std::{collections::HashMap, fmt, io};
use thiserror::Error as ThisError;

mod template;
pub use template::PostTemplate;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Failed to write markdown, cause: {0}")]
    Format(#[from] fmt::Error),
    #[error("Failed to serialize front matter, cause: {0}")]
    FrontMatter(#[from] serde_json::Error),
    #[error("Failed to convert HTML to markdown, cause: {0}")]
    Html(#[source] io::Error),
    #[error("Failed to load template, cause: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("Failed to render template, cause: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Media id to the path the markdown should reference instead of the
/// remote url.
pub type MediaPaths = HashMap<String, String>;

/// Renders a thread as one markdown document: front matter, a dated
/// heading, then every post of the thread separated by rules.
///
/// Post bodies arrive as HTML and are converted to markdown.
pub fn render_thread(thread: &Thread<'_>, media_paths: &MediaPaths) -> Result<String, Error> {
    let root = thread.post();
    let mut blocks = vec![front_matter(thread)?];

    let heading = Tag::Heading(HeadingLevel::H1, None, Vec::new());
    blocks.push(to_cmark(&[
        Event::Start(heading.clone()),
        Event::Text(root.created_at.format("%Y-%m-%d %H:%M").to_string().into()),
        Event::End(heading),
    ])?);

    for (position, post) in thread.posts().into_iter().enumerate() {
        if position > 0 {
            blocks.push(to_cmark(&[Event::Rule])?);
        }
        blocks.extend(render_post(post, media_paths)?);
    }

    let tags = tag_events(thread);
    if !tags.is_empty() {
        blocks.push(to_cmark(&tags)?);
    }

    if let Some(url) = root.url.as_deref().filter(|url| !url.is_empty()) {
        let link = Tag::Link(LinkType::Inline, url.to_string().into(), "".into());
        blocks.push(to_cmark(&paragraph(vec![
            Event::Start(link.clone()),
            Event::Text("Original post".into()),
            Event::End(link),
        ]))?);
    }

    let mut markdown = blocks.join("\n\n");
    markdown.push('\n');
    Ok(markdown)
}

fn render_post(post: &Post, media_paths: &MediaPaths) -> Result<Vec<String>, Error> {
    let mut blocks = Vec::new();

    if !post.spoiler_text.is_empty() {
        let mut events = vec![Event::Start(Tag::BlockQuote)];
        events.extend(paragraph(vec![Event::Text(
            post.spoiler_text.clone().into(),
        )]));
        events.push(Event::End(Tag::BlockQuote));
        blocks.push(to_cmark(&events)?);
    }

    let content = html_to_markdown(&post.content)?;
    if !content.is_empty() {
        blocks.push(content);
    }

    let media: Vec<Event> = post
        .media_attachments
        .iter()
        .flat_map(|media| paragraph(media_events(media, media_paths)))
        .collect();
    if !media.is_empty() {
        blocks.push(to_cmark(&media)?);
    }

    Ok(blocks)
}

pub fn html_to_markdown(html: &str) -> Result<String, Error> {
    let markdown = htmd::convert(html).map_err(Error::Html)?;
    Ok(markdown.trim().to_string())
}

fn media_events(media: &MediaAttachment, media_paths: &MediaPaths) -> Vec<Event<'static>> {
    let dest: CowStr = media_paths
        .get(&media.id)
        .cloned()
        .unwrap_or_else(|| media.url.clone())
        .into();
    let description = media.description.clone().unwrap_or_default();

    if media.is_image() {
        let image = Tag::Image(LinkType::Inline, dest, "".into());
        vec![
            Event::Start(image.clone()),
            Event::Text(description.into()),
            Event::End(image),
        ]
    } else {
        let link = Tag::Link(LinkType::Inline, dest, "".into());
        let text = if description.is_empty() {
            media.media_type.clone()
        } else {
            format!("{}: {}", media.media_type, description)
        };
        vec![
            Event::Start(link.clone()),
            Event::Text(text.into()),
            Event::End(link),
        ]
    }
}

fn tag_events(thread: &Thread<'_>) -> Vec<Event<'static>> {
    let mut seen = Vec::new();
    let mut inline = Vec::new();

    for tag in thread.all_tags() {
        if seen.contains(&tag.name) {
            continue;
        }
        seen.push(tag.name.clone());

        if !inline.is_empty() {
            inline.push(Event::Text(" ".into()));
        }
        let link = Tag::Link(LinkType::Inline, tag.url.clone().into(), "".into());
        inline.push(Event::Start(link.clone()));
        inline.push(Event::Text(format!("#{}", tag.name).into()));
        inline.push(Event::End(link));
    }

    if inline.is_empty() {
        inline
    } else {
        paragraph(inline)
    }
}

fn front_matter(thread: &Thread<'_>) -> Result<String, Error> {
    let root = thread.post();
    let mut tags: Vec<&str> = Vec::new();
    for tag in thread.all_tags() {
        if !tags.contains(&tag.name.as_str()) {
            tags.push(tag.name.as_str());
        }
    }

    // JSON scalars are valid YAML, so values are quoted with serde_json.
    let mut lines = vec![
        "---".to_string(),
        format!("id: {}", serde_json::to_string(root.id.as_str())?),
        format!("date: {}", serde_json::to_string(&root.created_at.to_rfc3339())?),
        format!("visibility: {}", serde_json::to_string(&root.visibility)?),
    ];
    if let Some(url) = root.url.as_deref() {
        lines.push(format!("url: {}", serde_json::to_string(url)?));
    }
    if let Some(language) = root.language.as_deref() {
        lines.push(format!("language: {}", serde_json::to_string(language)?));
    }
    lines.push(format!("tags: {}", serde_json::to_string(&tags)?));
    lines.push(format!("replies: {}", thread.descendants().len()));
    lines.push("---".to_string());

    Ok(lines.join("\n"))
}

fn paragraph(inline: Vec<Event<'static>>) -> Vec<Event<'static>> {
    let mut events = Vec::with_capacity(inline.len() + 2);
    events.push(Event::Start(Tag::Paragraph));
    events.extend(inline);
    events.push(Event::End(Tag::Paragraph));
    events
}

fn to_cmark(events: &[Event<'_>]) -> Result<String, fmt::Error> {
    let mut markdown = String::new();
    cmark(events.iter(), &mut markdown)?;
    Ok(markdown)
}
