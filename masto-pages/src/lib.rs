use log::debug;
use masto_markdown::{render_thread, MediaPaths};
use masto_msg::{MediaAttachment, Post};
use masto_threads::{should_skip, Thread};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::to_string_pretty;
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};
use tokio::fs::{canonicalize, create_dir_all, write};

pub use masto_markdown::PostTemplate;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to create directory {path}, cause: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write to file {path}, cause: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize JSON to string: {0}")]
    JsonToString(#[source] serde_json::Error),
    #[error("Failed to render markdown: {0}")]
    Markdown(#[from] masto_markdown::Error),
    #[error("Failed to download {url}, cause: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to download {url}, status {status}")]
    DownloadStatus { url: String, status: u16 },
    #[error("Could not match extension of {url} with content type {content_type:?}")]
    MediaExtension { url: String, content_type: String },
}

/// Where downloaded media goes, if anywhere.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum MediaMode {
    #[default]
    None,
    /// A directory per thread holding `index.<ext>` and its media.
    Bundle,
    /// One shared directory for the media of every thread.
    Dir(PathBuf),
}

impl MediaMode {
    /// `bundle` selects bundles, anything else is taken as a directory.
    pub fn from_arg(arg: &str) -> Self {
        match arg {
            "" => MediaMode::None,
            "bundle" => MediaMode::Bundle,
            dir => MediaMode::Dir(PathBuf::from(dir)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub base_dir: PathBuf,
    /// Placeholders: `{id}`, `{year}`, `{month}`, `{day}`.
    pub filename_template: String,
    pub media: MediaMode,
    /// Also write the posts of each thread as a JSON file.
    pub json: bool,
    /// Renders threads instead of the built in markdown layout.
    pub template: Option<PostTemplate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("posts"),
            filename_template: "{id}".to_string(),
            media: MediaMode::None,
            json: false,
            template: None,
        }
    }
}

#[derive(Debug, PartialEq)]
struct PostFile {
    path: PathBuf,
    dir: PathBuf,
    bundle: bool,
}

/// Whether a thread passes the visibility filter on its root.
pub fn should_write(thread: &Thread<'_>, visibility: Option<&str>) -> bool {
    !should_skip(&thread.post().visibility, visibility)
}

pub fn format_filename(template: &str, post: &Post) -> String {
    template
        .replace("{id}", post.id.as_str())
        .replace("{year}", &post.created_at.format("%Y").to_string())
        .replace("{month}", &post.created_at.format("%m").to_string())
        .replace("{day}", &post.created_at.format("%d").to_string())
}

fn post_file(config: &Config, thread: &Thread<'_>) -> PostFile {
    let filename = PathBuf::from(format_filename(&config.filename_template, thread.post()));
    let (stem, extension) = match filename.extension() {
        Some(extension) => (filename.with_extension(""), extension.to_os_string()),
        None => (filename.clone(), OsString::from("md")),
    };

    let bundle = config.media == MediaMode::Bundle && !thread.all_media().is_empty();
    if bundle {
        let dir = config.base_dir.join(stem);
        let mut name = OsString::from("index.");
        name.push(&extension);
        return PostFile {
            path: dir.join(name),
            dir,
            bundle,
        };
    }

    let mut name = config.base_dir.join(stem).into_os_string();
    name.push(".");
    name.push(&extension);
    let path = PathBuf::from(name);
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.base_dir.clone());
    PostFile { path, dir, bundle }
}

/// Writes one thread as markdown, downloading its images first when
/// configured to. Returns the path of the markdown file.
pub async fn write_thread(
    config: &Config,
    client: &Client,
    thread: &Thread<'_>,
) -> Result<PathBuf, Error> {
    let file = post_file(config, thread);
    make_dir(&file.dir).await?;

    let media_paths = download_media(config, client, thread, &file).await?;
    let markdown = match &config.template {
        Some(template) => template.render(thread, &media_paths)?,
        None => render_thread(thread, &media_paths)?,
    };
    write_file(&file.path, markdown).await?;

    if config.json {
        let json_path = file.path.with_extension("json");
        let json = to_string_pretty(&thread.posts()).map_err(Error::JsonToString)?;
        write_file(&json_path, json).await?;
    }

    debug!("Wrote {}", file.path.display());
    Ok(file.path)
}

async fn download_media(
    config: &Config,
    client: &Client,
    thread: &Thread<'_>,
    file: &PostFile,
) -> Result<MediaPaths, Error> {
    let mut media_paths = MediaPaths::new();
    let media_dir = match &config.media {
        MediaMode::None => return Ok(media_paths),
        MediaMode::Bundle => file.dir.clone(),
        MediaMode::Dir(dir) => dir.clone(),
    };

    let images: Vec<&MediaAttachment> = thread
        .all_media()
        .into_iter()
        .filter(|media| media.is_image())
        .collect();
    if images.is_empty() {
        return Ok(media_paths);
    }
    make_dir(&media_dir).await?;

    for media in images {
        let path = download_attachment(client, &media_dir, media).await?;
        let reference = if file.bundle {
            path.file_name().map(PathBuf::from).unwrap_or(path)
        } else {
            canonicalize(&path).await.map_err(|source| Error::WriteFile {
                path: path.clone(),
                source,
            })?
        };
        media_paths.insert(media.id.clone(), reference.display().to_string());
    }

    Ok(media_paths)
}

async fn download_attachment(
    client: &Client,
    dir: &Path,
    media: &MediaAttachment,
) -> Result<PathBuf, Error> {
    debug!("GET {}", media.url);
    let download_error = |source| Error::Download {
        url: media.url.clone(),
        source,
    };

    let response = client
        .get(&media.url)
        .header(ACCEPT, "image/*")
        .send()
        .await
        .map_err(download_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::DownloadStatus {
            url: media.url.clone(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .unwrap_or_default()
        .trim()
        .to_string();
    let extension =
        media_extension(&media.url, &content_type).ok_or_else(|| Error::MediaExtension {
            url: media.url.clone(),
            content_type,
        })?;

    let bytes = response.bytes().await.map_err(download_error)?;
    let path = dir.join(format!("{}.{}", media.id, extension));
    write_file(&path, bytes).await?;

    Ok(path)
}

/// The extension of `url`, if it is one `content_type` is known by.
fn media_extension(url: &str, content_type: &str) -> Option<String> {
    let path = url.split(|c| c == '?' || c == '#').next()?;
    let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let known = mime_guess::get_mime_extensions_str(content_type)?;

    if known.contains(&extension.as_str()) {
        Some(extension)
    } else {
        None
    }
}

async fn make_dir(path: &Path) -> Result<(), Error> {
    create_dir_all(path).await.map_err(|source| Error::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), Error> {
    write(path, contents).await.map_err(|source| Error::WriteFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use masto_msg::Account;
    use masto_ref::{AccountId, PostId};
    use masto_threads::{build_threads, flat_threads, Threads};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post(id: &str, parent: Option<&str>) -> Post {
        Post {
            id: PostId::new(id),
            in_reply_to_id: parent.map(PostId::new),
            created_at: Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap(),
            visibility: "public".into(),
            content: format!("<p>post {id}</p>"),
            account: Account {
                id: AccountId::new("owner"),
                ..Account::default()
            },
            ..Post::default()
        }
    }

    fn image(id: &str, url: String) -> MediaAttachment {
        MediaAttachment {
            id: id.into(),
            media_type: "image".into(),
            url,
            ..MediaAttachment::default()
        }
    }

    fn threads(posts: Vec<Post>) -> Threads {
        build_threads(posts, &AccountId::new("owner"), None)
    }

    fn config(base_dir: &Path) -> Config {
        Config {
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_format_filename() {
        let post = post("109", None);
        assert_eq!(format_filename("{id}", &post), "109");
        assert_eq!(
            format_filename("{year}/{month}/{day}-{id}.markdown", &post),
            "2023/04/05-109.markdown"
        );
    }

    #[test]
    fn test_post_file_extension() {
        let threads = threads(vec![post("1", None)]);
        let thread = threads.posts()[0];

        let file = post_file(&config(Path::new("out")), &thread);
        assert_eq!(file.path, PathBuf::from("out/1.md"));
        assert_eq!(file.dir, PathBuf::from("out"));
        assert!(!file.bundle);

        let config = Config {
            filename_template: "{year}/{id}.txt".into(),
            ..config(Path::new("out"))
        };
        let file = post_file(&config, &thread);
        assert_eq!(file.path, PathBuf::from("out/2023/1.txt"));
        assert_eq!(file.dir, PathBuf::from("out/2023"));
    }

    #[test]
    fn test_post_file_bundle_only_with_media() {
        let mut root = post("1", None);
        root.media_attachments = vec![image("m1", "https://files.example/m1.png".into())];
        let threads = threads(vec![root, post("2", None)]);
        let posts = threads.posts();
        let config = Config {
            media: MediaMode::Bundle,
            ..config(Path::new("out"))
        };

        let file = post_file(&config, &posts[0]);
        assert_eq!(file.path, PathBuf::from("out/1/index.md"));
        assert_eq!(file.dir, PathBuf::from("out/1"));
        assert!(file.bundle);

        let file = post_file(&config, &posts[1]);
        assert_eq!(file.path, PathBuf::from("out/2.md"));
        assert!(!file.bundle);
    }

    #[test]
    fn test_media_mode_from_arg() {
        assert_eq!(MediaMode::from_arg("bundle"), MediaMode::Bundle);
        assert_eq!(
            MediaMode::from_arg("media"),
            MediaMode::Dir(PathBuf::from("media"))
        );
    }

    #[test]
    fn test_media_extension() {
        assert_eq!(
            media_extension("https://files.example/a/m1.jpg", "image/jpeg"),
            Some("jpg".to_string())
        );
        assert_eq!(
            media_extension("https://files.example/m1.PNG?size=small", "image/png"),
            Some("png".to_string())
        );
        assert_eq!(
            media_extension("https://files.example/m1.png", "image/jpeg"),
            None
        );
        assert_eq!(media_extension("https://files.example/m1", "image/png"), None);
    }

    #[test]
    fn test_should_write() {
        let mut unlisted = post("2", None);
        unlisted.visibility = "unlisted".into();
        let threads = flat_threads(
            vec![post("1", None), unlisted],
            &AccountId::new("owner"),
            None,
        );
        let posts = threads.posts();

        assert!(should_write(&posts[0], Some("public")));
        assert!(!should_write(&posts[1], Some("public")));
        assert!(should_write(&posts[1], None));
    }

    #[tokio::test]
    async fn test_write_thread_with_json() {
        let dir = tempfile::tempdir().unwrap();
        let threads = threads(vec![post("2", Some("1")), post("1", None)]);
        let thread = threads.posts()[0];
        let config = Config {
            json: true,
            ..config(dir.path())
        };

        let path = write_thread(&config, &Client::new(), &thread)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("1.md"));
        let markdown = std::fs::read_to_string(&path).unwrap();
        assert!(markdown.contains("post 1"));
        assert!(markdown.contains("post 2"));

        let json = std::fs::read_to_string(dir.path().join("1.json")).unwrap();
        let posts: Vec<Post> = serde_json::from_str(&json).unwrap();
        let ids: Vec<&str> = posts.iter().map(|post| post.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_write_thread_with_template() {
        let dir = tempfile::tempdir().unwrap();
        let threads = threads(vec![post("2", Some("1")), post("1", None)]);
        let thread = threads.posts()[0];
        let config = Config {
            template: Some(
                PostTemplate::new("{{post.id}}{{#each descendants}} > {{id}}{{/each}}").unwrap(),
            ),
            ..config(dir.path())
        };

        let path = write_thread(&config, &Client::new(), &thread)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "1 > 2");
    }

    #[tokio::test]
    async fn test_write_thread_bundle_downloads_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/m1.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xff, 0xd8, 0xff]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut root = post("1", None);
        root.media_attachments = vec![
            image("m1", format!("{}/media/m1.jpg", server.uri())),
            MediaAttachment {
                id: "v1".into(),
                media_type: "video".into(),
                url: format!("{}/media/v1.mp4", server.uri()),
                ..MediaAttachment::default()
            },
        ];
        let threads = threads(vec![root]);
        let thread = threads.posts()[0];

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            media: MediaMode::Bundle,
            ..config(dir.path())
        };

        let path = write_thread(&config, &Client::new(), &thread)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("1").join("index.md"));
        let image = std::fs::read(dir.path().join("1").join("m1.jpg")).unwrap();
        assert_eq!(image, vec![0xff, 0xd8, 0xff]);

        let markdown = std::fs::read_to_string(&path).unwrap();
        assert!(markdown.contains("(m1.jpg)"));
        assert!(!markdown.contains(&format!("{}/media/m1.jpg", server.uri())));
        assert!(markdown.contains(&format!("{}/media/v1.mp4", server.uri())));
    }

    #[tokio::test]
    async fn test_write_thread_rejects_mismatched_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/m1.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let mut root = post("1", None);
        root.media_attachments = vec![image("m1", format!("{}/m1.png", server.uri()))];
        let threads = threads(vec![root]);
        let thread = threads.posts()[0];

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            media: MediaMode::Dir(dir.path().join("media")),
            ..config(dir.path())
        };

        let err = write_thread(&config, &Client::new(), &thread)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaExtension { .. }));
    }
}
