//! Note attachments (resources).
//!
//! An attachment is loaded from a local file or downloaded from a URL, hashed
//! with MD5 (the service identifies resource bodies by that digest) and added
//! to the note's resource list. When inserted in the content, an
//! `<en-media type=".." hash=".."/>` reference becomes the last block of the
//! note's Markdown, which is then encoded again. Notes without an embedded
//! Markdown copy get the reference appended to their markup instead.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::binding::{self, NoteBinding};
use crate::codec::encode_document;
use crate::enml::{self, EmbeddedSource};
use crate::models::{RemoteNote, Resource, ResourceAttributes, ResourceData};
use crate::notes::{self, NoteTarget};
use crate::session::Session;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Where attachment bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    File(std::path::PathBuf),
    Url(String),
}

impl AttachmentSource {
    /// `http(s)://` sources are downloaded, anything else is a local path.
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            AttachmentSource::Url(source.to_string())
        } else {
            AttachmentSource::File(source.into())
        }
    }
}

/// Attachment bytes plus what is known about them.
#[derive(Debug, Clone)]
pub struct LoadedAttachment {
    pub body: Vec<u8>,
    pub mime: String,
    pub file_name: Option<String>,
    pub source_url: Option<String>,
}

pub async fn load(source: &AttachmentSource) -> Result<LoadedAttachment> {
    match source {
        AttachmentSource::File(path) => load_file(path).await,
        AttachmentSource::Url(url) => load_url(url).await,
    }
}

async fn load_file(path: &Path) -> Result<LoadedAttachment> {
    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read attachment: {}", path.display()))?;
    let mime = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    Ok(LoadedAttachment {
        body,
        mime,
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        source_url: None,
    })
}

async fn load_url(url: &str) -> Result<LoadedAttachment> {
    let response = reqwest::Client::builder()
        .user_agent(concat!("enote/", env!("CARGO_PKG_VERSION")))
        .build()?
        .get(url)
        .send()
        .await
        .with_context(|| format!("Cannot download attachment: {}", url))?;

    if !response.status().is_success() {
        bail!("Cannot download attachment: {} returned {}", url, response.status());
    }

    // Content type from the response, then from the URL path
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            mime_guess::from_path(url)
                .first()
                .map(|m| m.essence_str().to_string())
        })
        .unwrap_or_else(|| DEFAULT_MIME.to_string());

    let body = response
        .bytes()
        .await
        .with_context(|| format!("Cannot download attachment: {}", url))?
        .to_vec();
    debug!(url, bytes = body.len(), %mime, "attachment downloaded");

    Ok(LoadedAttachment {
        body,
        mime,
        file_name: None,
        source_url: Some(url.to_string()),
    })
}

/// Lower-case hex of a body hash, two digits per byte.
pub fn hash_hex(hash: &[u8]) -> String {
    hex::encode(hash)
}

/// Resource for `loaded`. Inline resources are not flagged as attachments.
pub fn build_resource(loaded: LoadedAttachment, inline: bool) -> Resource {
    let digest = md5::compute(&loaded.body);
    Resource {
        guid: None,
        note_guid: None,
        mime: loaded.mime,
        data: ResourceData {
            size: loaded.body.len(),
            body_hash: digest.0.to_vec(),
            body: Some(loaded.body),
        },
        attributes: ResourceAttributes {
            file_name: loaded.file_name,
            source_url: loaded.source_url,
            attachment: !inline,
        },
    }
}

/// File name, source URL or "Unnamed {mime}".
pub fn resource_label(resource: &Resource) -> String {
    resource
        .attributes
        .file_name
        .clone()
        .or_else(|| resource.attributes.source_url.clone())
        .unwrap_or_else(|| format!("Unnamed {}", resource.mime))
}

/// One line of `enote attachments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub index: usize,
    pub label: String,
    pub mime: String,
    pub size: usize,
    pub hash: String,
}

/// How `detach` picks the attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSelector {
    Hash(String),
    Index(usize),
}

/// Result of [`attach`].
#[derive(Debug, Clone)]
pub struct Attached {
    pub title: String,
    pub hash: String,
    pub inserted: bool,
    /// The Markdown document with the media reference, when the note kept
    /// an embedded copy.
    pub document: Option<String>,
}

/// Add `source` to the note, optionally referencing it in the content.
///
/// When `target` names a bound file, the reference is added to the file's
/// own text, which is saved to the note and written back.
pub async fn attach(
    session: &Session,
    target: &NoteTarget,
    source: &AttachmentSource,
    insert: bool,
) -> Result<Attached> {
    let guid = target.guid.as_str();
    let local = read_local(target)?;
    let loaded = load(source).await?;
    let mut note = session.store().get_note(guid, true, false).await?;
    let resource = build_resource(loaded, insert);
    let hash = hash_hex(&resource.data.body_hash);

    let mut document = None;
    let mut inserted = false;
    if insert {
        let content = note.content.as_deref().unwrap_or("");
        match local.or_else(|| embedded_markdown(content)) {
            Some(markdown) => {
                let media = enml::media_element(&resource.mime, &hash);
                let text = append_media_line(&markdown, &media);
                note = reencode(session, note, &text).await?;
                document = Some(text);
                inserted = true;
            }
            None => {
                let stripped = enml::strip_embedded_source(content);
                match enml::append_media(&stripped, &resource.mime, &hash) {
                    Some(content) => {
                        note.content = Some(content);
                        inserted = true;
                    }
                    None => {
                        warn!(guid, "note content has no closing </en-note>, media not inserted")
                    }
                }
            }
        }
    }

    note.resources.get_or_insert_with(Vec::new).push(resource);
    let updated = session.store().update_note(&note).await?;
    let title = updated.title.unwrap_or_default();
    write_local(target, &title, document.as_deref())?;
    info!(guid, %hash, inserted, "attachment added");
    Ok(Attached {
        title,
        hash,
        inserted,
        document,
    })
}

fn read_local(target: &NoteTarget) -> Result<Option<String>> {
    target.file.as_deref().map(notes::read_document).transpose()
}

/// Write the new document to the bound file and record it as synced.
fn write_local(target: &NoteTarget, title: &str, document: Option<&str>) -> Result<()> {
    if let (Some(path), Some(document)) = (target.file.as_deref(), document) {
        notes::write_document(path, document)?;
        binding::save(path, &NoteBinding::new(&target.guid, title, document))?;
    }
    Ok(())
}

fn embedded_markdown(content: &str) -> Option<String> {
    match enml::find_embedded_source(content) {
        EmbeddedSource::Found(source) if !source.is_empty() => Some(source),
        _ => None,
    }
}

async fn reencode(session: &Session, note: RemoteNote, text: &str) -> Result<RemoteNote> {
    let encoded = encode_document(text, &session.config().markdown.render_options());
    Ok(notes::apply_to_note(session, note, encoded).await?.note)
}

/// `text` with `media` as its last block.
fn append_media_line(text: &str, media: &str) -> String {
    format!("{}\n\n{}\n", text.trim_end(), media)
}

/// `text` without its references to `hash`. Lines holding nothing else go
/// with them.
fn remove_media_lines(text: &str, hash: &str) -> String {
    let kept: String = text
        .split_inclusive('\n')
        .filter(|line| {
            line.trim().is_empty() || !enml::remove_media(line, hash).trim().is_empty()
        })
        .collect();
    let kept = enml::remove_media(&kept, hash);
    if kept == text {
        kept
    } else {
        format!("{}\n", kept.trim_end())
    }
}

pub async fn list(session: &Session, guid: &str) -> Result<Vec<AttachmentInfo>> {
    let note = session.store().get_note(guid, false, false).await?;
    Ok(note
        .resources
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, r)| AttachmentInfo {
            index,
            label: resource_label(r),
            mime: r.mime.clone(),
            size: r.data.size,
            hash: hash_hex(&r.data.body_hash),
        })
        .collect())
}

/// Resource number `index` of the note, with its body.
pub async fn fetch(session: &Session, guid: &str, index: usize) -> Result<Resource> {
    let note = session.store().get_note(guid, false, false).await?;
    let resources = note.resources.unwrap_or_default();
    let Some(resource) = resources.get(index) else {
        bail!("Attachment not found! (note has {} attachments)", resources.len());
    };
    let resource_guid = resource
        .guid
        .as_deref()
        .context("Attachment has no guid")?;
    let fetched = session.store().get_resource(resource_guid, true).await?;
    Ok(fetched)
}

/// Remove one attachment and every `<en-media>` that references it, from
/// the Markdown too when the note (or the bound file) has it.
pub async fn detach(
    session: &Session,
    target: &NoteTarget,
    selector: &AttachmentSelector,
) -> Result<Resource> {
    let guid = target.guid.as_str();
    let local = read_local(target)?;
    let mut note = session.store().get_note(guid, true, false).await?;
    let mut resources = note.resources.take().unwrap_or_default();

    let index = match selector {
        AttachmentSelector::Index(i) if *i < resources.len() => *i,
        AttachmentSelector::Index(_) => bail!("Attachment not found!"),
        AttachmentSelector::Hash(hash) => {
            let wanted = hash.to_lowercase();
            match resources
                .iter()
                .position(|r| hash_hex(&r.data.body_hash) == wanted)
            {
                Some(i) => i,
                None => bail!("Attachment not found!"),
            }
        }
    };

    let removed = resources.remove(index);
    let hash = hash_hex(&removed.data.body_hash);
    let content = note.content.clone().unwrap_or_default();
    let mut document = None;
    match local.or_else(|| embedded_markdown(&content)) {
        Some(markdown) => {
            let text = remove_media_lines(&markdown, &hash);
            note = reencode(session, note, &text).await?;
            document = Some(text);
        }
        None => note.content = Some(enml::remove_media(&content, &hash)),
    }
    note.resources = Some(resources);
    let updated = session.store().update_note(&note).await?;
    write_local(target, updated.title.as_deref().unwrap_or(""), document.as_deref())?;
    info!(guid, %hash, "attachment removed");
    Ok(removed)
}

pub async fn run_attachments(session: &Session, guid: &str) -> Result<()> {
    let list = list(session, guid).await?;
    if list.is_empty() {
        println!("Note has no attachments");
        return Ok(());
    }
    for info in list {
        println!(
            "{:>3}  {}  ({}, {} bytes)  hash: {}",
            info.index, info.label, info.mime, info.size, info.hash
        );
    }
    Ok(())
}

pub async fn run_fetch(session: &Session, guid: &str, index: usize, output: &Path) -> Result<()> {
    let resource = fetch(session, guid, index).await?;
    let label = resource_label(&resource);
    let body = resource.data.body.unwrap_or_default();
    tokio::fs::write(output, &body)
        .await
        .with_context(|| format!("Cannot write attachment: {}", output.display()))?;
    println!("Saved {} ({} bytes) to {}", label, body.len(), output.display());
    Ok(())
}

pub async fn run_detach(
    session: &Session,
    target: &NoteTarget,
    selector: &AttachmentSelector,
) -> Result<()> {
    let removed = detach(session, target, selector).await?;
    println!("Removed attachment {}", resource_label(&removed));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeSource;
    use crate::config::Config;
    use crate::store::memory::InMemoryNoteStore;
    use crate::store::NoteStore;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTENT: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><en-note style=\"\">\n<!-- Sublime:aGk=-->\n<p>hi</p></en-note>";

    async fn session_with_note() -> (Session, String) {
        let store = Arc::new(InMemoryNoteStore::new());
        let created = store
            .create_note(&RemoteNote {
                title: Some("Files".into()),
                content: Some(CONTENT.into()),
                ..Default::default()
            })
            .await
            .unwrap();
        (Session::new(store, Config::default()), created.guid.unwrap())
    }

    #[test]
    fn hash_hex_keeps_leading_zeros() {
        assert_eq!(hash_hex(&[0x00, 0x0a, 0xff]), "000aff");
    }

    #[test]
    fn sources_are_urls_or_paths() {
        assert_eq!(
            AttachmentSource::parse(" https://x.org/a.png "),
            AttachmentSource::Url("https://x.org/a.png".into())
        );
        assert_eq!(
            AttachmentSource::parse("a.png"),
            AttachmentSource::File("a.png".into())
        );
    }

    #[test]
    fn labels_fall_back_to_mime() {
        let mut r = Resource {
            mime: "image/png".into(),
            ..Default::default()
        };
        assert_eq!(resource_label(&r), "Unnamed image/png");
        r.attributes.source_url = Some("http://x/y".into());
        assert_eq!(resource_label(&r), "http://x/y");
        r.attributes.file_name = Some("y.png".into());
        assert_eq!(resource_label(&r), "y.png");
    }

    fn target(guid: &str) -> NoteTarget {
        NoteTarget {
            guid: guid.to_string(),
            file: None,
        }
    }

    #[test]
    fn media_lines_come_and_go() {
        let media = enml::media_element("text/plain", "ab12");
        let with = append_media_line("hi\n\n", &media);
        assert_eq!(with, "hi\n\n<en-media type=\"text/plain\" hash=\"ab12\"/>\n");
        assert_eq!(remove_media_lines(&with, "ab12"), "hi\n");
        assert_eq!(remove_media_lines(&with, "ffff"), with);
        assert_eq!(
            remove_media_lines(&format!("see {} here\n", media), "ab12"),
            "see  here\n"
        );
    }

    #[tokio::test]
    async fn attach_keeps_the_markdown_copy() {
        let (session, guid) = session_with_note().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"attachment body").unwrap();

        let attached = attach(&session, &target(&guid), &AttachmentSource::File(file), true)
            .await
            .unwrap();
        assert!(attached.inserted);
        assert_eq!(attached.hash, format!("{:x}", md5::compute(b"attachment body")));
        let media = format!("<en-media type=\"text/plain\" hash=\"{}\"/>", attached.hash);
        assert_eq!(attached.document, Some(format!("hi\n\n{}\n", media)));

        let opened = notes::open(&session, &guid, false).await.unwrap();
        assert_eq!(opened.decoded.source, DecodeSource::Embedded);
        assert!(opened.decoded.text.ends_with(&format!("hi\n\n{}\n", media)));
        assert!(opened.note.content.unwrap().contains(&media));

        let listed = list(&session, &guid).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].label, "notes.txt");
        assert_eq!(listed[0].size, 15);

        let fetched = fetch(&session, &guid, 0).await.unwrap();
        assert_eq!(fetched.data.body.as_deref(), Some(&b"attachment body"[..]));
        assert!(fetch(&session, &guid, 1).await.is_err());

        let removed = detach(
            &session,
            &target(&guid),
            &AttachmentSelector::Hash(attached.hash.to_uppercase()),
        )
        .await
        .unwrap();
        assert_eq!(resource_label(&removed), "notes.txt");
        let opened = notes::open(&session, &guid, false).await.unwrap();
        assert_eq!(opened.note.resource_count(), 0);
        assert_eq!(opened.decoded.source, DecodeSource::Embedded);
        assert!(opened.decoded.text.ends_with("\n\nhi\n"));
        assert!(!opened.note.content.unwrap().contains("<en-media"));
    }

    #[tokio::test]
    async fn notes_without_markdown_get_the_media_in_their_markup() {
        let store = Arc::new(InMemoryNoteStore::new());
        let created = store
            .create_note(&RemoteNote {
                title: Some("Clip".into()),
                content: Some("<en-note><p>web</p></en-note>".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let guid = created.guid.unwrap();
        let session = Session::new(store, Config::default());
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();

        let attached = attach(&session, &target(&guid), &AttachmentSource::File(file), true)
            .await
            .unwrap();
        assert!(attached.inserted);
        assert!(attached.document.is_none());
        let note = session.store().get_note(&guid, true, false).await.unwrap();
        assert_eq!(
            note.content.unwrap(),
            format!(
                "<en-note><p>web</p><en-media type=\"text/plain\" hash=\"{}\"/></en-note>",
                attached.hash
            )
        );

        detach(&session, &target(&guid), &AttachmentSelector::Index(0))
            .await
            .unwrap();
        let note = session.store().get_note(&guid, true, false).await.unwrap();
        assert_eq!(note.content.unwrap(), "<en-note><p>web</p></en-note>");
    }

    #[tokio::test]
    async fn bound_files_learn_about_their_media() {
        let store = Arc::new(InMemoryNoteStore::new());
        let session = Session::new(store, Config::default());
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("trip.md");
        std::fs::write(&doc, "---\ntitle: Trip\n---\n\nPacked.\n").unwrap();
        notes::send_file(&session, &doc, &Default::default(), false)
            .await
            .unwrap();
        let bound = notes::resolve_target(doc.to_str().unwrap()).unwrap();
        let pic = dir.path().join("map.png");
        std::fs::write(&pic, [0x89, b'P', b'N', b'G']).unwrap();

        let attached = attach(&session, &bound, &AttachmentSource::File(pic), true)
            .await
            .unwrap();
        let media = format!("<en-media type=\"image/png\" hash=\"{}\"/>", attached.hash);
        let text = std::fs::read_to_string(&doc).unwrap();
        assert_eq!(text, format!("---\ntitle: Trip\n---\n\nPacked.\n\n{}\n", media));
        assert!(!notes::file_status(&doc).unwrap().modified);

        notes::save_file(&session, &doc).await.unwrap();
        let note = session.store().get_note(&bound.guid, true, false).await.unwrap();
        assert!(note.content.unwrap().contains(&media));

        detach(&session, &bound, &AttachmentSelector::Index(0))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&doc).unwrap(),
            "---\ntitle: Trip\n---\n\nPacked.\n"
        );
    }

    #[tokio::test]
    async fn attach_without_insert_keeps_content() {
        let (session, guid) = session_with_note().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blob");
        std::fs::write(&file, [1u8, 2, 3]).unwrap();

        let attached = attach(&session, &target(&guid), &AttachmentSource::File(file), false)
            .await
            .unwrap();
        assert!(!attached.inserted);
        let note = session.store().get_note(&guid, true, false).await.unwrap();
        assert_eq!(note.content.as_deref(), Some(CONTENT));
        let resource = &note.resources.unwrap()[0];
        assert_eq!(resource.mime, DEFAULT_MIME);
        assert!(resource.attributes.attachment);

        let out = dir.path().join("copy");
        run_fetch(&session, &guid, 0, &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), vec![1u8, 2, 3]);

        assert!(detach(&session, &target(&guid), &AttachmentSelector::Index(3))
            .await
            .is_err());
        detach(&session, &target(&guid), &AttachmentSelector::Index(0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn url_sources_use_the_response_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pic"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png; charset=binary")
                    .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
            )
            .mount(&server)
            .await;

        let url = format!("{}/pic", server.uri());
        let loaded = load(&AttachmentSource::Url(url.clone())).await.unwrap();
        assert_eq!(loaded.mime, "image/png");
        assert_eq!(loaded.body.len(), 4);
        assert_eq!(loaded.source_url, Some(url));
        assert!(loaded.file_name.is_none());
    }

    #[tokio::test]
    async fn failed_downloads_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let url = format!("{}/missing", server.uri());
        assert!(load(&AttachmentSource::Url(url)).await.is_err());
    }
}
