use handlebars::{handlebars_helper, no_escape, Handlebars};
use masto_msg::{Post, Tag};
use masto_threads::Thread;
use serde::Serialize;
use std::path::Path;

use crate::{html_to_markdown, Error, MediaPaths};

const TEMPLATE_NAME: &str = "thread";

handlebars_helper!(to_markdown: |html: str| {
    html_to_markdown(html).unwrap_or_else(|_| html.to_string())
});

#[derive(Serialize)]
struct TemplateContext<'a> {
    post: &'a Post,
    descendants: Vec<&'a Post>,
    tags: Vec<&'a Tag>,
    media: &'a MediaPaths,
}

/// A handlebars template rendering a thread in place of [`crate::render_thread`].
///
/// Templates see `post` (the root), `descendants`, `tags` and `media`, which
/// maps media ids to downloaded files. Output is not HTML-escaped; post bodies
/// are converted with `{{to_markdown post.content}}`.
#[derive(Clone, Debug)]
pub struct PostTemplate {
    handlebars: Handlebars<'static>,
}

impl PostTemplate {
    pub fn new(source: &str) -> Result<Self, Error> {
        let mut handlebars = registry();
        handlebars.register_template_string(TEMPLATE_NAME, source)?;
        Ok(Self { handlebars })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut handlebars = registry();
        handlebars.register_template_file(TEMPLATE_NAME, path)?;
        Ok(Self { handlebars })
    }

    pub fn render(&self, thread: &Thread<'_>, media_paths: &MediaPaths) -> Result<String, Error> {
        let context = TemplateContext {
            post: thread.post(),
            descendants: thread.descendants(),
            tags: thread.all_tags(),
            media: media_paths,
        };
        Ok(self.handlebars.render(TEMPLATE_NAME, &context)?)
    }
}

fn registry() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(no_escape);
    handlebars.register_helper("to_markdown", Box::new(to_markdown));
    handlebars
}
