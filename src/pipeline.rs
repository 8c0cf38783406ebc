//! Verification run: enumerate, fan out over fragments, validate.
//!
//! Enumeration of the whole asset finishes before any fragment is fetched.
//! Fragments are then fetched and parsed with bounded concurrency; each
//! worker sends its outcome to a single collector task, and the collected
//! outcomes are sorted before validation so reports are deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vodcheck_common::{ContainerFormat, ManifestFormat, RenditionId, ValidationIssue};
use vodcheck_manifest::{
    enumerate_manifest, parse_iframe_playlist, sample_evenly, ByteRange, Encryption, Enumeration,
    FetchContext, FetchResponse, Fetcher, Fragment, Manifest, Rendition, SideResourceKind,
};
use vodcheck_media::ts::{demux, ContinuityError};
use vodcheck_media::{decrypt_segment, extract_timing, segment_iv, timing_from_summary, TrackTiming};

use crate::check::{check_cross_stream, check_in_stream, KeyframeChecker, Observation};
use crate::config::Config;
use crate::report::{RenditionSummary, Report};

/// Decoded content of one fragment.
#[derive(Debug, Clone, Default)]
struct FragmentData {
    timings: Vec<TrackTiming>,
    continuity_errors: Vec<ContinuityError>,
}

/// What a worker reports for one fragment.
#[derive(Debug)]
struct FragmentOutcome {
    rendition_order: usize,
    rendition: RenditionId,
    segment_index: u32,
    url: String,
    result: std::result::Result<FragmentData, String>,
}

/// One unit of fan-out work.
struct FragmentJob<'a> {
    rendition_order: usize,
    rendition: &'a Rendition,
    fragment: &'a Fragment,
}

/// Location of a fragment URL in the unsampled enumeration.
#[derive(Debug, Clone)]
struct FragmentLocation {
    rendition: RenditionId,
    segment_index: u32,
    encryption: Option<Encryption>,
}

type KeyCache = HashMap<String, std::result::Result<Bytes, String>>;

/// Collect `Set-Cookie` values into a single `Cookie` header value.
pub fn cookie_header(response: &FetchResponse) -> Option<String> {
    let cookies: Vec<&str> = response
        .header_all("set-cookie")
        .iter()
        .filter_map(|c| c.split(';').next())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    (!cookies.is_empty()).then(|| cookies.join("; "))
}

/// Runs a verification over one asset.
pub struct Verifier {
    fetcher: Arc<dyn Fetcher>,
    config: Config,
}

impl Verifier {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: Config) -> Self {
        Self { fetcher, config }
    }

    fn base_headers(&self) -> Vec<(String, String)> {
        self.config
            .fetch
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Verify the asset behind `entry_url`.
    ///
    /// Fails only when the entry manifest itself cannot be fetched or
    /// enumerated; everything else is reported as issues.
    pub async fn run(&self, entry_url: &str, cancel: CancellationToken) -> Result<Report> {
        let entry_ctx = FetchContext::new(self.fetcher.as_ref(), self.base_headers());
        let response = entry_ctx
            .get(entry_url)
            .await
            .with_context(|| format!("Failed to fetch manifest {}", entry_url))?;

        let mut headers = self.base_headers();
        if let Some(cookie) = cookie_header(&response) {
            debug!(%cookie, "forwarding cookies");
            headers.push(("Cookie".to_string(), cookie));
        }
        let ctx = FetchContext::new(self.fetcher.as_ref(), headers);

        let manifest = Manifest::from_response(&response)
            .with_context(|| format!("Cannot select a manifest format for {}", entry_url))?;
        let enumeration = enumerate_manifest(&ctx, &manifest)
            .await
            .with_context(|| format!("Failed to enumerate {}", manifest.url))?;
        info!(
            format = %manifest.format,
            renditions = enumeration.renditions.len(),
            fragments = enumeration.fragment_count(),
            "manifest enumerated"
        );

        let mut report = Report::new(&manifest.url, manifest.format);
        report.skipped_references = enumeration.skipped.clone();
        let locations = locate_fragments(&enumeration);

        let mut sampled = enumeration.clone();
        let max = self.config.run.max_fragments_per_list;
        for (original, rendition) in enumeration.renditions.iter().zip(sampled.renditions.iter_mut()) {
            rendition.sample_fragments(max);
            report.renditions.push(RenditionSummary {
                id: rendition.id.clone(),
                bandwidth: rendition.bandwidth,
                track: rendition.track,
                container: rendition.container,
                declared_fragments: original.fragments.len(),
                checked_fragments: rendition.fragments.len(),
                encrypted: rendition.fragments.iter().any(|f| f.encryption.is_some()),
            });
        }

        let mut keys = KeyCache::new();
        for rendition in &sampled.renditions {
            for encryption in rendition.fragments.iter().filter_map(|f| f.encryption.as_ref()) {
                self.load_key(&ctx, &mut keys, &encryption.key_url).await;
            }
        }

        let outcomes = self.process_fragments(&ctx, &sampled, &keys, &cancel).await?;
        let total = sampled.fragment_count();
        report.fragments_processed = outcomes.len();
        report.fragments_skipped = total - outcomes.len();

        for outcome in outcomes {
            match outcome.result {
                Ok(data) => {
                    if self.config.validation.check_continuity {
                        for error in &data.continuity_errors {
                            report.issues.push(ValidationIssue::continuity_error(
                                outcome.rendition.clone(),
                                outcome.segment_index,
                                &outcome.url,
                                error.to_string(),
                            ));
                        }
                    }
                    for timing in data.timings {
                        report.observations.push(Observation {
                            rendition: outcome.rendition.clone(),
                            rendition_order: outcome.rendition_order,
                            segment_index: outcome.segment_index,
                            track: timing.track,
                            timing: timing.timing,
                        });
                    }
                }
                Err(reason) => report.issues.push(ValidationIssue::decode_failure(
                    outcome.rendition,
                    outcome.segment_index,
                    outcome.url,
                    reason,
                )),
            }
        }

        let threshold = manifest
            .format
            .scale_threshold(self.config.validation.threshold_ticks);
        report
            .issues
            .extend(check_in_stream(&report.observations, threshold));
        report
            .issues
            .extend(check_cross_stream(&report.observations, threshold));

        if self.config.validation.check_keyframes
            && manifest.format == ManifestFormat::SegmentedPlaylist
        {
            let issues = self
                .check_keyframe_indexes(&ctx, &enumeration, &locations, &mut keys, &cancel)
                .await;
            report.issues.extend(issues);
        }

        report.cancelled = cancel.is_cancelled();
        report.sort_issues();
        info!(
            processed = report.fragments_processed,
            skipped = report.fragments_skipped,
            issues = report.issues.len(),
            cancelled = report.cancelled,
            "run complete"
        );
        Ok(report)
    }

    async fn load_key(&self, ctx: &FetchContext<'_>, keys: &mut KeyCache, url: &str) {
        if keys.contains_key(url) {
            return;
        }
        let key = match ctx.get(url).await {
            Ok(response) => Ok(response.body),
            Err(err) => {
                warn!(url, error = %err, "key fetch failed");
                Err(format!("key fetch failed: {}", err))
            }
        };
        keys.insert(url.to_string(), key);
    }

    async fn process_fragments(
        &self,
        ctx: &FetchContext<'_>,
        enumeration: &Enumeration,
        keys: &KeyCache,
        cancel: &CancellationToken,
    ) -> Result<Vec<FragmentOutcome>> {
        let jobs: Vec<FragmentJob<'_>> = enumeration
            .renditions
            .iter()
            .enumerate()
            .flat_map(|(order, rendition)| {
                rendition.fragments.iter().map(move |fragment| FragmentJob {
                    rendition_order: order,
                    rendition,
                    fragment,
                })
            })
            .collect();

        let (tx, mut rx) = mpsc::channel::<FragmentOutcome>(self.config.run.concurrency.max(1) * 2);
        let collector = tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Some(outcome) = rx.recv().await {
                outcomes.push(outcome);
            }
            outcomes
        });

        {
            let mut workers = stream::iter(jobs)
                .map(|job| {
                    let tx = tx.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let outcome = self.process_fragment(ctx, keys, job).await;
                        if tx.send(outcome).await.is_err() {
                            warn!("outcome collector closed early");
                        }
                    }
                })
                .buffer_unordered(self.config.run.concurrency.max(1));
            while workers.next().await.is_some() {}
        }
        drop(tx);

        let mut outcomes = collector.await.context("Outcome collector failed")?;
        outcomes.sort_by_key(|o| (o.rendition_order, o.segment_index));
        Ok(outcomes)
    }

    async fn process_fragment(
        &self,
        ctx: &FetchContext<'_>,
        keys: &KeyCache,
        job: FragmentJob<'_>,
    ) -> FragmentOutcome {
        let FragmentJob {
            rendition_order,
            rendition,
            fragment,
        } = job;
        let result = self.decode_fragment(ctx, keys, rendition, fragment).await;
        if let Err(reason) = &result {
            debug!(url = %fragment.url, %reason, "fragment failed");
        }
        FragmentOutcome {
            rendition_order,
            rendition: rendition.id.clone(),
            segment_index: fragment.segment_index,
            url: fragment.url.clone(),
            result,
        }
    }

    /// Range to request for a fragment: its declared byte range, or a header
    /// prefix for unencrypted box-based fragments.
    fn fragment_range(&self, rendition: &Rendition, fragment: &Fragment) -> Option<ByteRange> {
        if fragment.byte_range.is_some() {
            return fragment.byte_range;
        }
        let prefix = self.config.fetch.header_prefix_bytes;
        (rendition.container == ContainerFormat::IsoBmff
            && fragment.encryption.is_none()
            && prefix > 0)
            .then(|| ByteRange::new(0, prefix))
    }

    async fn fetch_fragment(
        &self,
        ctx: &FetchContext<'_>,
        keys: &KeyCache,
        url: &str,
        segment_index: u32,
        range: Option<ByteRange>,
        encryption: Option<&Encryption>,
    ) -> std::result::Result<Bytes, String> {
        let response = ctx
            .get_range(url, range)
            .await
            .map_err(|e| e.to_string())?;
        let Some(encryption) = encryption else {
            return Ok(response.body);
        };
        if !encryption.is_aes128() {
            return Err(format!("unsupported encryption method {}", encryption.method));
        }
        let key = match keys.get(&encryption.key_url) {
            Some(Ok(key)) => key,
            Some(Err(reason)) => return Err(reason.clone()),
            None => return Err(format!("key {} not loaded", encryption.key_url)),
        };
        let iv = encryption.iv.unwrap_or_else(|| segment_iv(segment_index));
        decrypt_segment(&response.body, key, &iv).map_err(|e| format!("decrypt failed: {}", e))
    }

    async fn decode_fragment(
        &self,
        ctx: &FetchContext<'_>,
        keys: &KeyCache,
        rendition: &Rendition,
        fragment: &Fragment,
    ) -> std::result::Result<FragmentData, String> {
        let data = self
            .fetch_fragment(
                ctx,
                keys,
                &fragment.url,
                fragment.segment_index,
                self.fragment_range(rendition, fragment),
                fragment.encryption.as_ref(),
            )
            .await?;

        let mut decoded = FragmentData::default();
        if rendition.container == ContainerFormat::TransportStream {
            let summary = demux(&data).map_err(|e| e.to_string())?;
            decoded.timings = timing_from_summary(&summary);
            decoded.continuity_errors = summary.continuity_errors;
        } else {
            decoded.timings =
                extract_timing(&data, rendition.container, rendition.track).map_err(|e| e.to_string())?;
        }

        if decoded.timings.is_empty() {
            return Err("no timestamps found".to_string());
        }
        if let Some(bad) = decoded.timings.iter().find(|t| !t.timing.is_well_formed()) {
            return Err(format!("{} timing ends before it starts: {:?}", bad.track, bad.timing));
        }
        Ok(decoded)
    }

    async fn check_keyframe_indexes(
        &self,
        ctx: &FetchContext<'_>,
        enumeration: &Enumeration,
        locations: &HashMap<String, FragmentLocation>,
        keys: &mut KeyCache,
        cancel: &CancellationToken,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let tolerance = self.config.validation.keyframe_tolerance_ticks;

        for (n, index_url) in enumeration
            .side_resources_of(SideResourceKind::KeyframeIndex)
            .enumerate()
        {
            let fallback = RenditionId::new(format!("iframes-{}", n + 1));
            let segments = match ctx.get(index_url).await {
                Ok(response) => parse_iframe_playlist(&response.text(), &response.url)
                    .map_err(|e| e.to_string()),
                Err(err) => Err(err.to_string()),
            };
            let segments = match segments {
                Ok(segments) => sample_evenly(&segments, self.config.run.max_fragments_per_list),
                Err(reason) => {
                    issues.push(ValidationIssue::decode_failure(
                        fallback,
                        0,
                        index_url,
                        format!("keyframe index unreadable: {}", reason),
                    ));
                    continue;
                }
            };
            info!(url = index_url, segments = segments.len(), "checking keyframe index");

            let mut checker = KeyframeChecker::new(tolerance);
            for (i, declared) in segments.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let location = locations.get(&declared.url).cloned().unwrap_or(FragmentLocation {
                    rendition: fallback.clone(),
                    segment_index: i as u32 + 1,
                    encryption: None,
                });
                if let Some(encryption) = &location.encryption {
                    self.load_key(ctx, keys, &encryption.key_url).await;
                }
                let summary = match self
                    .fetch_fragment(
                        ctx,
                        keys,
                        &declared.url,
                        location.segment_index,
                        None,
                        location.encryption.as_ref(),
                    )
                    .await
                    .and_then(|data| demux(&data).map_err(|e| e.to_string()))
                {
                    Ok(summary) => summary,
                    Err(reason) => {
                        issues.push(ValidationIssue::decode_failure(
                            location.rendition,
                            location.segment_index,
                            &declared.url,
                            reason,
                        ));
                        continue;
                    }
                };
                issues.extend(checker.check_segment(
                    &location.rendition,
                    location.segment_index,
                    declared,
                    &summary,
                ));
            }
        }
        issues
    }
}

/// Map every fragment URL to the rendition and segment it belongs to.
fn locate_fragments(enumeration: &Enumeration) -> HashMap<String, FragmentLocation> {
    let mut locations = HashMap::new();
    for rendition in &enumeration.renditions {
        for fragment in &rendition.fragments {
            locations
                .entry(fragment.url.clone())
                .or_insert_with(|| FragmentLocation {
                    rendition: rendition.id.clone(),
                    segment_index: fragment.segment_index,
                    encryption: fragment.encryption.clone(),
                });
        }
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let response = FetchResponse::new("http://h/m.m3u8", 200, "")
            .with_header("Set-Cookie", "session=abc; Path=/; HttpOnly")
            .with_header("set-cookie", "edge=1");
        assert_eq!(cookie_header(&response).as_deref(), Some("session=abc; edge=1"));
        assert!(cookie_header(&FetchResponse::new("http://h/x", 200, "")).is_none());
    }
}
