//! Template-manifest (MPD) enumeration.
//!
//! Each representation's fragments come from, in order of preference: an
//! explicit `SegmentList`, a `SegmentTemplate` with a `SegmentTimeline`, a
//! `SegmentTemplate` with a fixed duration (count derived from the period
//! bounds and the live window), or a bare `BaseURL`.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use vodcheck_common::{ContainerFormat, RenditionId, TrackKind};

use crate::error::{ManifestError, Result};
use crate::fetch::ByteRange;
use crate::model::{
    resolve_url, Enumeration, Fragment, Manifest, Rendition, SideResourceKind,
    MAX_FRAGMENTS_PER_RENDITION,
};
use crate::xml::{parse_document, Element};

/// Parse an ISO-8601 duration (`PnDTnHnMnS`, also `PnYnMnW`) into seconds.
pub fn parse_duration(value: &str) -> Option<f64> {
    let rest = value.trim().strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut seconds = 0.0;
    let mut number = String::new();
    for c in date.chars() {
        let unit = match c {
            'Y' => 365.0 * 86_400.0,
            'M' => 30.0 * 86_400.0,
            'W' => 7.0 * 86_400.0,
            'D' => 86_400.0,
            _ => {
                number.push(c);
                continue;
            }
        };
        seconds += number.parse::<f64>().ok()? * unit;
        number.clear();
    }
    if !number.is_empty() {
        return None;
    }
    for c in time.unwrap_or("").chars() {
        let unit = match c {
            'H' => 3_600.0,
            'M' => 60.0,
            'S' => 1.0,
            _ => {
                number.push(c);
                continue;
            }
        };
        seconds += number.parse::<f64>().ok()? * unit;
        number.clear();
    }
    if !number.is_empty() {
        return None;
    }
    Some(seconds)
}

/// Parse an RFC 3339 date.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Values substituted into a segment template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub representation_id: &'a str,
    pub bandwidth: Option<u64>,
    pub number: Option<u64>,
    pub time: Option<u64>,
}

fn format_width(value: u64, format: &str) -> String {
    // `%05d` style; anything else falls back to plain decimal.
    let width = format
        .strip_prefix('%')
        .and_then(|f| f.strip_suffix('d'))
        .and_then(|w| w.trim_start_matches('0').parse::<usize>().ok());
    match width {
        Some(w) => format!("{:0width$}", value, width = w),
        None => value.to_string(),
    }
}

/// Expand `$Number$`, `$Time$`, `$RepresentationID$`, `$Bandwidth$` and
/// `$$`. Identifiers may carry a printf width, e.g. `$Number%05d$`.
/// Unknown or unavailable identifiers are left as written.
pub fn expand_template(template: &str, vars: &TemplateVars<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('$') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let token = &after[..end];
        rest = &after[end + 1..];
        if token.is_empty() {
            out.push('$');
            continue;
        }
        let (name, format) = match token.find('%') {
            Some(i) => (&token[..i], &token[i..]),
            None => (token, ""),
        };
        let value = match name {
            "RepresentationID" => Some(vars.representation_id.to_string()),
            "Number" => vars.number.map(|n| format_width(n, format)),
            "Time" => vars.time.map(|t| format_width(t, format)),
            "Bandwidth" => vars.bandwidth.map(|b| format_width(b, format)),
            _ => None,
        };
        match value {
            Some(v) => out.push_str(&v),
            None => {
                out.push('$');
                out.push_str(token);
                out.push('$');
            }
        }
    }
    out.push_str(rest);
    out
}

/// One `S` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimelineEntry {
    t: Option<u64>,
    d: u64,
    r: i64,
}

/// `SegmentTemplate` attributes after inheritance.
#[derive(Debug, Clone, Default, PartialEq)]
struct SegmentTemplate {
    media: Option<String>,
    initialization: Option<String>,
    timescale: Option<u64>,
    duration: Option<u64>,
    start_number: Option<u64>,
    presentation_time_offset: Option<u64>,
    timeline: Option<Vec<TimelineEntry>>,
}

impl SegmentTemplate {
    fn from_element(e: &Element) -> Self {
        let num = |name: &str| e.attr(name).and_then(|v| v.trim().parse::<u64>().ok());
        let timeline = e.child("SegmentTimeline").map(|tl| {
            tl.children_named("S")
                .filter_map(|s| {
                    Some(TimelineEntry {
                        t: s.attr("t").and_then(|v| v.parse().ok()),
                        d: s.attr("d")?.parse().ok()?,
                        r: s.attr("r").and_then(|v| v.parse().ok()).unwrap_or(0),
                    })
                })
                .collect()
        });
        Self {
            media: e.attr("media").map(str::to_string),
            initialization: e.attr("initialization").map(str::to_string),
            timescale: num("timescale"),
            duration: num("duration"),
            start_number: num("startNumber"),
            presentation_time_offset: num("presentationTimeOffset"),
            timeline,
        }
    }

    /// Child attributes win; missing ones come from `parent`.
    fn inherit(self, parent: &SegmentTemplate) -> Self {
        Self {
            media: self.media.or_else(|| parent.media.clone()),
            initialization: self.initialization.or_else(|| parent.initialization.clone()),
            timescale: self.timescale.or(parent.timescale),
            duration: self.duration.or(parent.duration),
            start_number: self.start_number.or(parent.start_number),
            presentation_time_offset: self
                .presentation_time_offset
                .or(parent.presentation_time_offset),
            timeline: self.timeline.or_else(|| parent.timeline.clone()),
        }
    }

    fn timescale(&self) -> u64 {
        self.timescale.filter(|t| *t > 0).unwrap_or(1)
    }

    fn start_number(&self) -> u64 {
        self.start_number.unwrap_or(1)
    }
}

/// Presentation-level attributes of the MPD root.
#[derive(Debug, Clone, Default)]
struct Presentation {
    media_duration: Option<f64>,
    time_shift_buffer_depth: Option<f64>,
    availability_start: Option<DateTime<Utc>>,
    publish_time: Option<DateTime<Utc>>,
}

/// Period bounds in seconds from the presentation start.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PeriodBounds {
    start: f64,
    end: Option<f64>,
}

fn period_bounds(periods: &[&Element], index: usize, presentation: &Presentation) -> PeriodBounds {
    let attr_secs = |p: &Element, name: &str| p.attr(name).and_then(parse_duration);
    let period = periods[index];
    let start = attr_secs(period, "start").unwrap_or(0.0);

    let end = if let Some(duration) = attr_secs(period, "duration") {
        Some(start + duration)
    } else if let Some(next) = periods.get(index + 1).and_then(|p| attr_secs(p, "start")) {
        Some(next)
    } else if let Some(total) = presentation.media_duration {
        Some(total.max(start))
    } else {
        match (presentation.publish_time, presentation.availability_start) {
            (Some(publish), Some(ast)) => {
                Some((publish - ast).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    };
    PeriodBounds { start, end }
}

/// Segment numbers in scope for a fixed-duration template.
///
/// `total = ceil(L / d)`; with a live window only the trailing
/// `timeShiftBufferDepth` is addressable, which skips
/// `ceil((windowStart - periodStart) / d)` leading numbers.
fn computed_numbers(
    bounds: PeriodBounds,
    segment_secs: f64,
    time_shift_buffer_depth: Option<f64>,
    start_number: u64,
) -> Option<std::ops::Range<u64>> {
    let end = bounds.end?;
    if segment_secs <= 0.0 {
        return None;
    }
    // Millisecond precision keeps float noise out of the ceilings.
    let d = (segment_secs * 1000.0).round() as u64;
    let length = ((end - bounds.start) * 1000.0).round().max(0.0) as u64;
    if d == 0 {
        return None;
    }
    let total = length.div_ceil(d);
    let skip = match time_shift_buffer_depth {
        Some(depth) => {
            let window_start = ((end - depth) * 1000.0).round() as i64;
            let period_start = (bounds.start * 1000.0).round() as i64;
            if window_start > period_start {
                ((window_start - period_start) as u64).div_ceil(d)
            } else {
                0
            }
        }
        None => 0,
    };
    Some(start_number.checked_add(skip.min(total))?..start_number.checked_add(total)?)
}

fn base_url_of(element: &Element, parent: &str) -> Result<String> {
    match element.child("BaseURL").map(Element::trimmed_text) {
        Some(base) if !base.is_empty() => resolve_url(parent, base),
        _ => Ok(parent.to_string()),
    }
}

fn content_hint(element: &Element) -> Option<&str> {
    element.attr("contentType").or_else(|| element.attr("mimeType"))
}

/// Track kind of an element, `None` for anything other than audio or video.
/// Elements without a content hint inherit from their parent.
fn track_of(element: &Element, inherited: Option<TrackKind>) -> Option<TrackKind> {
    match content_hint(element) {
        None | Some("") => inherited,
        Some(hint) if hint.contains("audio") => Some(TrackKind::Audio),
        Some(hint) if hint.contains("video") => Some(TrackKind::Video),
        Some(_) => None,
    }
}

fn parse_media_range(value: &str) -> Option<ByteRange> {
    let (a, b) = value.split_once('-')?;
    let start: u64 = a.trim().parse().ok()?;
    let end: u64 = b.trim().parse().ok()?;
    (end >= start).then(|| ByteRange::new(start, end - start + 1))
}

/// Fragments of one representation within one period.
struct RepresentationFragments {
    init_url: Option<String>,
    /// URL, byte range and declared duration in seconds.
    entries: Vec<(String, Option<ByteRange>, Option<f64>)>,
}

struct PeriodContext<'a> {
    url: &'a str,
    bounds: PeriodBounds,
    presentation: &'a Presentation,
}

fn segment_list_fragments(
    list: &Element,
    base: &str,
) -> Result<RepresentationFragments> {
    let timescale = list
        .attr("timescale")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|t| *t > 0)
        .unwrap_or(1);
    let duration = list
        .attr("duration")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|d| d as f64 / timescale as f64);
    let init_url = match list.child("Initialization").and_then(|i| i.attr("sourceURL")) {
        Some(source) => Some(resolve_url(base, source)?),
        None => None,
    };
    let mut entries = Vec::new();
    for segment in list.children_named("SegmentURL") {
        let url = match segment.attr("media") {
            Some(media) => resolve_url(base, media)?,
            None => base.to_string(),
        };
        let range = segment.attr("mediaRange").and_then(parse_media_range);
        entries.push((url, range, duration));
    }
    Ok(RepresentationFragments { init_url, entries })
}

fn template_fragments(
    ctx: &PeriodContext<'_>,
    template: &SegmentTemplate,
    base: &str,
    vars: TemplateVars<'_>,
) -> Result<RepresentationFragments> {
    let init_url = match &template.initialization {
        Some(init) => Some(resolve_url(base, &expand_template(init, &vars))?),
        None => None,
    };
    let Some(media) = &template.media else {
        return Ok(RepresentationFragments {
            init_url,
            entries: Vec::new(),
        });
    };
    let timescale = template.timescale();
    let pto = template.presentation_time_offset.unwrap_or(0);
    let start_number = template.start_number();
    let mut entries = Vec::new();

    if let Some(timeline) = &template.timeline {
        let period_end_ticks = ctx.bounds.end.map(|end| {
            pto.saturating_add(((end - ctx.bounds.start).max(0.0) * timescale as f64).round() as u64)
        });
        let mut time = pto;
        let mut number = start_number;
        for (i, s) in timeline.iter().enumerate() {
            if let Some(t) = s.t {
                time = t;
            }
            if s.d == 0 {
                continue;
            }
            let count = if s.r >= 0 {
                s.r as u64 + 1
            } else {
                // Negative repeat runs to the next entry's start or the period end.
                let limit = timeline
                    .get(i + 1)
                    .and_then(|next| next.t)
                    .or(period_end_ticks)
                    .unwrap_or(time.saturating_add(s.d));
                limit.saturating_sub(time).div_ceil(s.d)
            };
            if count > MAX_FRAGMENTS_PER_RENDITION.saturating_sub(entries.len() as u64) {
                return Err(ManifestError::parse(
                    ctx.url,
                    format!(
                        "segment timeline expands past {} segments",
                        MAX_FRAGMENTS_PER_RENDITION
                    ),
                ));
            }
            for _ in 0..count {
                let url = expand_template(
                    media,
                    &TemplateVars {
                        number: Some(number),
                        time: Some(time),
                        ..vars.clone()
                    },
                );
                entries.push((
                    resolve_url(base, &url)?,
                    None,
                    Some(s.d as f64 / timescale as f64),
                ));
                time = time.checked_add(s.d).ok_or_else(|| {
                    ManifestError::parse(ctx.url, "segment timeline time overflows")
                })?;
                number = number.checked_add(1).ok_or_else(|| {
                    ManifestError::parse(ctx.url, "segment number overflows")
                })?;
            }
        }
    } else if let Some(duration) = template.duration.filter(|d| *d > 0) {
        let segment_secs = duration as f64 / timescale as f64;
        let numbers = computed_numbers(
            ctx.bounds,
            segment_secs,
            ctx.presentation.time_shift_buffer_depth,
            start_number,
        )
        .ok_or_else(|| ManifestError::parse(ctx.url, "cannot determine period end"))?;
        if numbers.end - numbers.start > MAX_FRAGMENTS_PER_RENDITION {
            return Err(ManifestError::parse(
                ctx.url,
                format!(
                    "segment template expands past {} segments",
                    MAX_FRAGMENTS_PER_RENDITION
                ),
            ));
        }
        for number in numbers {
            let time = (number - start_number)
                .checked_mul(duration)
                .and_then(|offset| pto.checked_add(offset))
                .ok_or_else(|| ManifestError::parse(ctx.url, "segment template time overflows"))?;
            let url = expand_template(
                media,
                &TemplateVars {
                    number: Some(number),
                    time: Some(time),
                    ..vars.clone()
                },
            );
            entries.push((resolve_url(base, &url)?, None, Some(segment_secs)));
        }
    } else {
        return Err(ManifestError::parse(
            ctx.url,
            "segment template has neither a timeline nor a duration",
        ));
    }
    Ok(RepresentationFragments { init_url, entries })
}

fn append_fragments(
    enumeration: &mut Enumeration,
    id: RenditionId,
    bandwidth: Option<u64>,
    track: TrackKind,
    fragments: RepresentationFragments,
) {
    if let Some(init) = &fragments.init_url {
        enumeration.add_side_resource(SideResourceKind::Init, init.clone());
    }
    let position = match enumeration.renditions.iter().position(|r| r.id == id) {
        Some(i) => i,
        None => {
            let mut rendition = Rendition::new(id, track, ContainerFormat::IsoBmff);
            rendition.bandwidth = bandwidth;
            enumeration.renditions.push(rendition);
            enumeration.renditions.len() - 1
        }
    };
    let rendition = &mut enumeration.renditions[position];
    if rendition.init_url.is_none() {
        rendition.init_url = fragments.init_url;
    }
    for (url, range, duration) in fragments.entries {
        let mut fragment = Fragment::new(url, rendition.fragments.len() as u32 + 1);
        fragment.byte_range = range;
        fragment.duration = duration;
        rendition.fragments.push(fragment);
    }
}

/// Enumerate an MPD.
pub fn enumerate(manifest: &Manifest) -> Result<Enumeration> {
    let root = parse_document(&manifest.url, &manifest.body)?;
    if root.name != "MPD" {
        return Err(ManifestError::parse(&manifest.url, "root element is not MPD"));
    }
    let presentation = Presentation {
        media_duration: root.attr("mediaPresentationDuration").and_then(parse_duration),
        time_shift_buffer_depth: root.attr("timeShiftBufferDepth").and_then(parse_duration),
        availability_start: root.attr("availabilityStartTime").and_then(parse_date),
        publish_time: root.attr("publishTime").and_then(parse_date),
    };
    let mpd_base = base_url_of(&root, &manifest.url)?;

    let mut enumeration = Enumeration::new(manifest.format, &manifest.url);
    let periods: Vec<&Element> = root.children_named("Period").collect();
    let mut ordinal = 0;

    for (index, period) in periods.iter().enumerate() {
        let ctx = PeriodContext {
            url: &manifest.url,
            bounds: period_bounds(&periods, index, &presentation),
            presentation: &presentation,
        };
        debug!(period = index, bounds = ?ctx.bounds, "period");
        let period_base = base_url_of(period, &mpd_base)?;
        let period_template = period
            .child("SegmentTemplate")
            .map(SegmentTemplate::from_element)
            .unwrap_or_default();

        for set in period.children_named("AdaptationSet") {
            let set_base = base_url_of(set, &period_base)?;
            let set_track = track_of(set, Some(TrackKind::Video));
            let set_template = set
                .child("SegmentTemplate")
                .map(|t| SegmentTemplate::from_element(t).inherit(&period_template));
            let set_list = set.child("SegmentList");

            for representation in set.children_named("Representation") {
                ordinal += 1;
                let rep_id = representation
                    .attr("id")
                    .map(str::to_string)
                    .unwrap_or_else(|| RenditionId::from_ordinal(ordinal).to_string());
                let bandwidth = representation
                    .attr("bandwidth")
                    .and_then(|b| b.parse::<u64>().ok());
                let rep_base = base_url_of(representation, &set_base)?;
                let Some(track) = track_of(representation, set_track) else {
                    let hint = content_hint(representation)
                        .or_else(|| content_hint(set))
                        .unwrap_or("unknown");
                    enumeration.skip(
                        rep_base,
                        format!("{} renditions are not verified", hint),
                    );
                    continue;
                };

                let rep_template = representation.child("SegmentTemplate").map(|t| {
                    SegmentTemplate::from_element(t)
                        .inherit(set_template.as_ref().unwrap_or(&period_template))
                });
                let template = rep_template.or_else(|| set_template.clone()).or_else(|| {
                    period.child("SegmentTemplate").map(|_| period_template.clone())
                });
                let list = representation.child("SegmentList").or(set_list);

                let fragments = if let Some(list) = list {
                    segment_list_fragments(list, &rep_base)?
                } else if let Some(template) = template {
                    let vars = TemplateVars {
                        representation_id: &rep_id,
                        bandwidth,
                        number: None,
                        time: None,
                    };
                    template_fragments(&ctx, &template, &rep_base, vars)?
                } else {
                    RepresentationFragments {
                        init_url: None,
                        entries: vec![(rep_base.clone(), None, None)],
                    }
                };

                append_fragments(
                    &mut enumeration,
                    RenditionId::new(rep_id.clone()),
                    bandwidth,
                    track,
                    fragments,
                );
            }
        }
    }

    info!(
        periods = periods.len(),
        renditions = enumeration.renditions.len(),
        fragments = enumeration.fragment_count(),
        "mpd enumerated"
    );
    Ok(enumeration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodcheck_common::ManifestFormat;

    fn manifest(body: &str) -> Manifest {
        Manifest::new(ManifestFormat::TemplateManifest, "http://h/a/manifest.mpd", body)
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("PT1H2M3.5S"), Some(3723.5));
        assert_eq!(parse_duration("P1DT1S"), Some(86_401.0));
        assert_eq!(parse_duration("PT30S"), Some(30.0));
        assert_eq!(parse_duration("PT"), Some(0.0));
        assert!(parse_duration("30S").is_none());
        assert!(parse_duration("PT5").is_none());
    }

    #[test]
    fn test_expand_template() {
        let vars = TemplateVars {
            representation_id: "v1",
            bandwidth: Some(800_000),
            number: Some(7),
            time: Some(90_000),
        };
        assert_eq!(
            expand_template("$RepresentationID$/seg-$Number%05d$-$Time$.m4s", &vars),
            "v1/seg-00007-90000.m4s"
        );
        assert_eq!(expand_template("a$$b-$Bandwidth$", &vars), "a$b-800000");
        assert_eq!(expand_template("x-$Unknown$", &vars), "x-$Unknown$");
    }

    #[test]
    fn test_fixed_duration_count_is_ceiling() {
        // 61 s period with 10 s segments: ceil(61 / 10) = 7 numbers from 3.
        let body = r#"<MPD mediaPresentationDuration="PT61S">
          <Period id="0" start="PT0S">
            <AdaptationSet mimeType="video/mp4">
              <SegmentTemplate timescale="1000" duration="10000" startNumber="3"
                initialization="init-$RepresentationID$.mp4"
                media="frag-$Number$-$RepresentationID$.m4s"/>
              <Representation id="v1" bandwidth="800000"/>
              <Representation id="v2" bandwidth="1600000"/>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        let e = enumerate(&manifest(body)).unwrap();
        assert_eq!(e.renditions.len(), 2);
        let v1 = &e.renditions[0];
        assert_eq!(v1.fragments.len(), 7);
        assert_eq!(v1.fragments[0].url, "http://h/a/frag-3-v1.m4s");
        assert_eq!(v1.fragments[6].url, "http://h/a/frag-9-v1.m4s");
        assert_eq!(v1.fragments[6].segment_index, 7);
        assert_eq!(v1.init_url.as_deref(), Some("http://h/a/init-v1.mp4"));
        assert_eq!(v1.container, ContainerFormat::IsoBmff);
        assert_eq!(e.side_resources_of(SideResourceKind::Init).count(), 2);
    }

    #[test]
    fn test_live_window_skips_leading_numbers() {
        // Period spans 0..600 s per publish - availability; window is 60 s.
        let body = r#"<MPD type="dynamic" availabilityStartTime="2024-01-01T00:00:00Z"
              publishTime="2024-01-01T00:10:00Z" timeShiftBufferDepth="PT60S">
          <Period id="p0" start="PT0S">
            <AdaptationSet contentType="audio">
              <SegmentTemplate timescale="1" duration="10" media="a-$Number$.m4s"/>
              <Representation id="a1" bandwidth="64000"/>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        let e = enumerate(&manifest(body)).unwrap();
        let a1 = &e.renditions[0];
        assert_eq!(a1.track, TrackKind::Audio);
        assert_eq!(a1.fragments.len(), 6);
        assert_eq!(a1.fragments[0].url, "http://h/a/a-55.m4s");
        assert_eq!(a1.fragments[5].url, "http://h/a/a-60.m4s");
    }

    #[test]
    fn test_timeline_with_repeats_and_representation_override() {
        let body = r#"<MPD mediaPresentationDuration="PT30S">
          <BaseURL>http://cdn/base/</BaseURL>
          <Period start="PT0S">
            <AdaptationSet mimeType="video/mp4">
              <SegmentTemplate timescale="90000" media="v-$Time$.m4s">
                <SegmentTimeline>
                  <S t="0" d="900000" r="1"/>
                  <S d="450000"/>
                </SegmentTimeline>
              </SegmentTemplate>
              <Representation id="v1" bandwidth="1">
                <SegmentTemplate media="$RepresentationID$/t-$Time$.m4s"/>
              </Representation>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        let e = enumerate(&manifest(body)).unwrap();
        let urls: Vec<_> = e.renditions[0].fragments.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://cdn/base/v1/t-0.m4s",
                "http://cdn/base/v1/t-900000.m4s",
                "http://cdn/base/v1/t-1800000.m4s",
            ]
        );
        assert_eq!(e.renditions[0].fragments[2].duration, Some(5.0));
    }

    #[test]
    fn test_segment_list_and_base_url_only() {
        let body = r#"<MPD mediaPresentationDuration="PT20S">
          <Period>
            <AdaptationSet mimeType="video/mp4">
              <Representation id="v1">
                <SegmentList timescale="1000" duration="10000">
                  <Initialization sourceURL="v1/init.mp4"/>
                  <SegmentURL media="v1/1.m4s"/>
                  <SegmentURL media="v1/2.m4s"/>
                </SegmentList>
              </Representation>
            </AdaptationSet>
            <AdaptationSet mimeType="text/vtt">
              <Representation id="subs">
                <BaseURL>subs/en.vtt</BaseURL>
              </Representation>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        let e = enumerate(&manifest(body)).unwrap();
        assert_eq!(e.renditions[0].fragments.len(), 2);
        assert_eq!(e.renditions[0].fragments[1].url, "http://h/a/v1/2.m4s");
        assert_eq!(e.renditions[0].fragments[1].duration, Some(10.0));
        assert_eq!(e.renditions[0].init_url.as_deref(), Some("http://h/a/v1/init.mp4"));
        assert_eq!(e.renditions.len(), 1);
        assert_eq!(e.skipped.len(), 1);
        assert_eq!(e.skipped[0].url, "http://h/a/subs/en.vtt");
        assert!(e.skipped[0].reason.contains("text/vtt"));
    }

    #[test]
    fn test_subtitle_and_image_sets_are_skipped() {
        let body = r#"<MPD mediaPresentationDuration="PT8S">
          <Period>
            <AdaptationSet contentType="text" mimeType="application/mp4">
              <SegmentTemplate timescale="1" duration="4" media="stpp-$Number$.m4s"/>
              <Representation id="stpp"/>
            </AdaptationSet>
            <AdaptationSet mimeType="image/jpeg">
              <SegmentTemplate timescale="1" duration="4" media="thumb-$Number$.jpg"/>
              <Representation id="thumbs"/>
            </AdaptationSet>
            <AdaptationSet>
              <SegmentTemplate timescale="1" duration="4" media="a-$Number$.m4s"/>
              <Representation id="a" mimeType="audio/mp4"/>
              <Representation id="v"/>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        let e = enumerate(&manifest(body)).unwrap();
        let tracks: Vec<_> = e
            .renditions
            .iter()
            .map(|r| (r.id.as_str(), r.track))
            .collect();
        assert_eq!(tracks, vec![("a", TrackKind::Audio), ("v", TrackKind::Video)]);
        assert_eq!(e.skipped.len(), 2);
        assert!(e.skipped[0].reason.starts_with("text"));
        assert!(e.skipped[1].reason.starts_with("image/jpeg"));
    }

    #[test]
    fn test_runaway_negative_repeat_rejected() {
        let body = r#"<MPD mediaPresentationDuration="PT86400S">
          <Period start="PT0S">
            <AdaptationSet mimeType="video/mp4">
              <SegmentTemplate timescale="1000000000" media="v-$Time$.m4s">
                <SegmentTimeline><S t="0" d="1" r="-1"/></SegmentTimeline>
              </SegmentTemplate>
              <Representation id="v"/>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        assert!(matches!(
            enumerate(&manifest(body)),
            Err(ManifestError::Parse { .. })
        ));
    }

    #[test]
    fn test_timeline_time_overflow_rejected() {
        let body = r#"<MPD mediaPresentationDuration="PT10S">
          <Period start="PT0S">
            <AdaptationSet mimeType="video/mp4">
              <SegmentTemplate timescale="1" media="v-$Time$.m4s">
                <SegmentTimeline>
                  <S t="18446744073709551610" d="4" r="3"/>
                </SegmentTimeline>
              </SegmentTemplate>
              <Representation id="v"/>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        assert!(matches!(
            enumerate(&manifest(body)),
            Err(ManifestError::Parse { .. })
        ));
    }

    #[test]
    fn test_period_end_from_next_period() {
        let body = r#"<MPD>
          <Period id="1" start="PT0S">
            <AdaptationSet>
              <SegmentTemplate timescale="1" duration="4" media="p1-$Number$.m4s"/>
              <Representation id="v"/>
            </AdaptationSet>
          </Period>
          <Period id="2" start="PT8S" duration="PT4S">
            <AdaptationSet>
              <SegmentTemplate timescale="1" duration="4" media="p2-$Number$.m4s"/>
              <Representation id="v"/>
            </AdaptationSet>
          </Period>
        </MPD>"#;
        let e = enumerate(&manifest(body)).unwrap();
        assert_eq!(e.renditions.len(), 1);
        let urls: Vec<_> = e.fragment_urls();
        assert_eq!(
            urls,
            vec!["http://h/a/p1-1.m4s", "http://h/a/p1-2.m4s", "http://h/a/p2-1.m4s"]
        );
        assert_eq!(e.renditions[0].fragments[2].segment_index, 3);
    }

    #[test]
    fn test_unbounded_period_is_an_error() {
        let body = r#"<MPD><Period><AdaptationSet>
            <SegmentTemplate duration="4" media="x-$Number$.m4s"/>
            <Representation id="v"/>
        </AdaptationSet></Period></MPD>"#;
        assert!(matches!(
            enumerate(&manifest(body)),
            Err(ManifestError::Parse { .. })
        ));
    }
}
