use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use tagrelay_core::RouteTemplate;
use tagrelay_provider::Release;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

fn timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), BoxError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Atom 1.0 document listing `releases` of `channel`, one entry per release
/// linking to its gateway download route.
pub fn render_atom(channel: &str, releases: &[Release], routes: &RouteTemplate) -> Result<String, BoxError> {
    let self_url = format!("{}/feed/channel/{}.atom", routes.base(), channel);
    let updated = releases
        .iter()
        .map(|r| r.published_at)
        .max()
        .unwrap_or_else(Utc::now);

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("feed").with_attributes([("xmlns", ATOM_NS)]),
    ))?;
    text_element(&mut writer, "id", &format!("versions/channels/{}", channel))?;
    text_element(&mut writer, "title", &format!("Versions ({})", channel))?;
    text_element(&mut writer, "updated", &timestamp(&updated))?;
    writer.write_event(Event::Empty(
        BytesStart::new("link").with_attributes([("rel", "self"), ("href", self_url.as_str())]),
    ))?;

    for release in releases {
        let link = routes.download_release(&release.tag);
        writer.write_event(Event::Start(BytesStart::new("entry")))?;
        text_element(&mut writer, "id", &link)?;
        text_element(&mut writer, "title", &release.tag)?;
        text_element(&mut writer, "updated", &timestamp(&release.published_at))?;
        writer.write_event(Event::Empty(
            BytesStart::new("link").with_attributes([("href", link.as_str())]),
        ))?;
        if !release.notes.is_empty() {
            text_element(&mut writer, "summary", &release.notes)?;
        }
        writer.write_event(Event::End(BytesEnd::new("entry")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("feed")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}
