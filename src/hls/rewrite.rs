//! Line-level HLS playlist rewriting.
//!
//! Every whole-line URI reference in a playlist (segment, variant playlist,
//! rendition) is resolved against the playlist's own URL and replaced with a
//! relay URL carrying the absolute target in its `url` query parameter. The
//! player then fetches everything through the relay.
//!
//! The engine works on lines, not on a parsed playlist model, so it handles
//! master and media playlists alike and never drops tags it does not know.
//!
//! Known gap: URIs embedded in directive attributes (`#EXT-X-KEY:URI="..."`,
//! `#EXT-X-MAP:URI="..."`, `#EXT-X-MEDIA:URI="..."`) are left untouched.
//! Directive lines are emitted verbatim.

use tracing::{debug, warn};
use url::{Url, form_urlencoded};

/// Marker that starts every playlist tag and comment.
const DIRECTIVE_MARKER: char = '#';

/// A single playlist line, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistLine<'a> {
    /// Empty or whitespace-only.
    Blank,
    /// Tag or comment; the full original line.
    Directive(&'a str),
    /// URI reference, trimmed.
    Uri(&'a str),
}

/// Classify one line (without its terminator).
pub fn classify_line(line: &str) -> PlaylistLine<'_> {
    // Some encoders prefix the first line with a UTF-8 BOM.
    let trimmed = line.trim().trim_start_matches('\u{feff}');

    if trimmed.is_empty() {
        PlaylistLine::Blank
    } else if trimmed.starts_with(DIRECTIVE_MARKER) {
        PlaylistLine::Directive(line)
    } else {
        PlaylistLine::Uri(trimmed)
    }
}

/// Split text into `(content, terminator)` pairs.
///
/// The terminator is `"\n"`, `"\r\n"` or `""` (last line without newline),
/// so joining every pair reproduces the input exactly.
pub fn split_lines(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split_inclusive('\n').map(|chunk| {
        if let Some(content) = chunk.strip_suffix("\r\n") {
            (content, "\r\n")
        } else if let Some(content) = chunk.strip_suffix('\n') {
            (content, "\n")
        } else {
            (chunk, "")
        }
    })
}

/// Tagged view of a whole playlist, in line order.
pub fn classify(text: &str) -> impl Iterator<Item = PlaylistLine<'_>> {
    split_lines(text).map(|(content, _)| classify_line(content))
}

/// Build the relay URL for an absolute target.
///
/// The target is form-encoded, which is exactly what the relay's query
/// extractor decodes, so the round trip is lossless (`+` and `&` in the
/// target survive).
pub fn proxied_url(relay_base: &str, target: &Url) -> String {
    let encoded: String = form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
    format!("{relay_base}?url={encoded}")
}

/// Result of rewriting a playlist body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenPlaylist {
    pub body: String,
    /// Number of URI lines replaced with relay URLs.
    pub rewritten: usize,
}

/// Rewrite every URI line of `playlist` to route through `relay_base`.
///
/// `base` is the URL the playlist was fetched from; relative references are
/// resolved against it with standard RFC 3986 rules, absolute ones are kept
/// as they are. Line order, line count and line terminators are preserved.
/// Whitespace-only lines come out empty.
///
/// Not idempotent: rewriting an already rewritten playlist wraps each relay
/// URL a second time.
pub fn rewrite_playlist(playlist: &str, base: &Url, relay_base: &str) -> RewrittenPlaylist {
    let mut body = String::with_capacity(playlist.len() * 2);
    let mut rewritten = 0;

    for (content, terminator) in split_lines(playlist) {
        match classify_line(content) {
            PlaylistLine::Blank => {}
            PlaylistLine::Directive(line) => body.push_str(line),
            PlaylistLine::Uri(reference) => match base.join(reference) {
                Ok(absolute) => {
                    debug!("Rewriting {} -> {}", reference, absolute);
                    body.push_str(&proxied_url(relay_base, &absolute));
                    rewritten += 1;
                }
                Err(e) => {
                    warn!("Leaving unresolvable playlist URI {:?} as is: {}", reference, e);
                    body.push_str(content);
                }
            },
        }
        body.push_str(terminator);
    }

    RewrittenPlaylist { body, rewritten }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY: &str = "https://relay.example.com/";

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    /// Decode the `url` parameter back out of a rewritten line.
    fn target_of(line: &str) -> String {
        let parsed = Url::parse(line).expect("rewritten line should be a URL");
        parsed
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())
            .expect("rewritten line should carry url=")
    }

    #[test]
    fn classifies_lines() {
        assert_eq!(classify_line(""), PlaylistLine::Blank);
        assert_eq!(classify_line("   \t"), PlaylistLine::Blank);
        assert_eq!(
            classify_line("#EXTINF:10.0,"),
            PlaylistLine::Directive("#EXTINF:10.0,")
        );
        assert_eq!(
            classify_line("  #EXT-X-ENDLIST"),
            PlaylistLine::Directive("  #EXT-X-ENDLIST")
        );
        assert_eq!(classify_line(" seg0.ts "), PlaylistLine::Uri("seg0.ts"));
        assert_eq!(
            classify_line("\u{feff}#EXTM3U"),
            PlaylistLine::Directive("\u{feff}#EXTM3U")
        );
    }

    #[test]
    fn split_lines_is_lossless() {
        let text = "#EXTM3U\r\nseg.ts\n\nlast";
        let rejoined: String = split_lines(text).flat_map(|(c, t)| [c, t]).collect();
        assert_eq!(rejoined, text);
        assert_eq!(split_lines(text).count(), 4);
    }

    #[test]
    fn relative_segment_resolves_against_playlist_directory() {
        let out = rewrite_playlist(
            "720p/seg0.ts",
            &base("https://cdn.example.com/videos/stream/master.m3u8"),
            RELAY,
        );
        assert_eq!(
            target_of(&out.body),
            "https://cdn.example.com/videos/stream/720p/seg0.ts"
        );
        assert!(out.body.starts_with("https://relay.example.com/?url="));
        assert_eq!(out.rewritten, 1);
    }

    #[test]
    fn absolute_reference_is_not_reresolved() {
        let out = rewrite_playlist(
            "https://other.example.com/x.m3u8",
            &base("https://cdn.example.com/a/b/master.m3u8"),
            RELAY,
        );
        assert_eq!(target_of(&out.body), "https://other.example.com/x.m3u8");
    }

    #[test]
    fn root_and_scheme_relative_references() {
        let b = base("https://cdn.example.com/a/b/master.m3u8");

        let out = rewrite_playlist("/root/seg.ts", &b, RELAY);
        assert_eq!(target_of(&out.body), "https://cdn.example.com/root/seg.ts");

        let out = rewrite_playlist("//edge.example.net/seg.ts", &b, RELAY);
        assert_eq!(target_of(&out.body), "https://edge.example.net/seg.ts");

        let out = rewrite_playlist("../up.ts", &b, RELAY);
        assert_eq!(target_of(&out.body), "https://cdn.example.com/a/up.ts");
    }

    #[test]
    fn query_strings_survive_the_round_trip() {
        let out = rewrite_playlist(
            "seg0.ts?token=a+b&exp=1700000000&sig=x%2Fy",
            &base("https://cdn.example.com/live/index.m3u8"),
            RELAY,
        );
        assert_eq!(
            target_of(&out.body),
            "https://cdn.example.com/live/seg0.ts?token=a+b&exp=1700000000&sig=x%2Fy"
        );
        assert!(!out.body.contains('&'), "target must be fully encoded");
    }

    #[test]
    fn line_structure_is_preserved() {
        let playlist = "#EXTM3U\n\
                        #EXT-X-VERSION:3\n\
                        #EXT-X-TARGETDURATION:10\n\
                        \n\
                        #EXTINF:10.0,\n\
                        seg0.ts\n\
                        \u{20}\u{20}\n\
                        #EXTINF:10.0,\n\
                        seg1.ts\n\
                        #EXT-X-ENDLIST\n";
        let out = rewrite_playlist(playlist, &base("https://cdn.example.com/v/index.m3u8"), RELAY);

        let input: Vec<&str> = playlist.lines().collect();
        let output: Vec<&str> = out.body.lines().collect();
        assert_eq!(input.len(), output.len());

        let mut unchanged = 0;
        for (i, o) in input.iter().zip(&output) {
            match classify_line(i) {
                PlaylistLine::Directive(_) => {
                    assert_eq!(i, o);
                    unchanged += 1;
                }
                PlaylistLine::Blank => {
                    assert_eq!(*o, "");
                    unchanged += 1;
                }
                PlaylistLine::Uri(_) => {
                    assert!(o.starts_with("https://relay.example.com/?url=https%3A%2F%2F"));
                }
            }
        }
        assert_eq!(unchanged, 8);
        assert_eq!(out.rewritten, 2);
        assert!(out.body.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn crlf_terminators_are_kept() {
        let out = rewrite_playlist(
            "#EXTM3U\r\n#EXTINF:4,\r\nseg.ts\r\n",
            &base("https://cdn.example.com/index.m3u8"),
            RELAY,
        );
        assert_eq!(out.body.matches("\r\n").count(), 3);
        assert!(out.body.starts_with("#EXTM3U\r\n#EXTINF:4,\r\nhttps://relay.example.com/?url="));
    }

    #[test]
    fn missing_final_newline_is_not_added() {
        let out = rewrite_playlist(
            "#EXTM3U\nseg.ts",
            &base("https://cdn.example.com/index.m3u8"),
            RELAY,
        );
        assert!(!out.body.ends_with('\n'));
    }

    #[test]
    fn master_playlist_variants_are_rewritten() {
        let master = "#EXTM3U\n\
                      #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\"\n\
                      360p/index.m3u8\n\
                      #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n\
                      https://mirror.example.org/720p/index.m3u8\n";
        let out = rewrite_playlist(master, &base("https://cdn.example.com/show/master.m3u8"), RELAY);

        let lines: Vec<&str> = out.body.lines().collect();
        assert_eq!(lines[1], master.lines().nth(1).unwrap());
        assert_eq!(target_of(lines[2]), "https://cdn.example.com/show/360p/index.m3u8");
        assert_eq!(target_of(lines[4]), "https://mirror.example.org/720p/index.m3u8");
    }

    #[test]
    fn directive_attribute_uris_are_not_rewritten() {
        let playlist = "#EXTM3U\n\
                        #EXT-X-KEY:METHOD=AES-128,URI=\"keys/key0.bin\"\n\
                        #EXT-X-MAP:URI=\"init.mp4\"\n\
                        #EXTINF:6,\n\
                        seg0.m4s\n";
        let out = rewrite_playlist(playlist, &base("https://cdn.example.com/v/index.m3u8"), RELAY);

        assert!(out.body.contains("#EXT-X-KEY:METHOD=AES-128,URI=\"keys/key0.bin\"\n"));
        assert!(out.body.contains("#EXT-X-MAP:URI=\"init.mp4\"\n"));
        assert_eq!(out.rewritten, 1);
    }

    #[test]
    fn rewriting_twice_double_wraps() {
        let b = base("https://cdn.example.com/index.m3u8");
        let once = rewrite_playlist("seg.ts\n", &b, RELAY);
        let twice = rewrite_playlist(&once.body, &b, RELAY);

        let inner = target_of(twice.body.trim_end());
        assert!(inner.starts_with("https://relay.example.com/?url="));
        assert_eq!(target_of(&inner), "https://cdn.example.com/seg.ts");
    }

    #[test]
    fn empty_playlist_yields_empty_body() {
        let out = rewrite_playlist("", &base("https://cdn.example.com/index.m3u8"), RELAY);
        assert_eq!(out.body, "");
        assert_eq!(out.rewritten, 0);
    }

    #[test]
    fn classify_tags_whole_playlist() {
        let tags: Vec<PlaylistLine> = classify("#EXTM3U\n\nseg.ts\n").collect();
        assert_eq!(
            tags,
            vec![
                PlaylistLine::Directive("#EXTM3U"),
                PlaylistLine::Blank,
                PlaylistLine::Uri("seg.ts"),
            ]
        );
    }
}
