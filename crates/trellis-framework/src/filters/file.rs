//! Filters over attached documents.

use trellis_core::EventKind;

use crate::filter::Filter;

/// Common picture extensions.
pub const PICTURES: &[&str] = &["png", "jpeg", "jpg", "webp", "gif", "bmp", "tga", "tiff", "psd"];

/// Common video extensions.
pub const VIDEOS: &[&str] = &["mp4", "mov", "avi"];

/// Common audio extensions.
pub const MUSIC: &[&str] = &["mp3", "m4a", "aac", "ogg", "flac", "mp2"];

/// Passes when the message carries a file whose extension is in `extensions`.
///
/// Extensions are compared case-insensitively, with or without the leading
/// dot: `extension_in(["PNG", ".jpg"])` accepts `photo.png` and `scan.JPG`.
pub fn extension_in<I, S>(extensions: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let extensions: Vec<String> = extensions
        .into_iter()
        .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let name = format!("file.extension_in({extensions:?})");

    Filter::on(EventKind::NewMessage, move |event| {
        event
            .file_name()
            .and_then(|name| name.rsplit_once('.'))
            .is_some_and(|(_, ext)| extensions.contains(&ext.to_ascii_lowercase()))
    })
    .named(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use trellis_core::{BoxedEvent, Event};

    #[derive(Debug)]
    struct Document(Option<&'static str>);

    impl Event for Document {
        fn kind(&self) -> EventKind {
            EventKind::NewMessage
        }

        fn file_name(&self) -> Option<&str> {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    async fn passes(filter: &Filter, name: Option<&'static str>) -> bool {
        filter.call(Some(BoxedEvent::new(Document(name)))).await
    }

    #[tokio::test]
    async fn test_extension_matching() {
        let images = extension_in(["PNG", ".jpg"]);
        assert!(passes(&images, Some("photo.png")).await);
        assert!(passes(&images, Some("scan.final.JPG")).await);
        assert!(!passes(&images, Some("notes.txt")).await);
        assert!(!passes(&images, Some("png")).await);
        assert!(!passes(&images, None).await);

        assert!(passes(&extension_in(MUSIC), Some("song.flac")).await);
    }
}
