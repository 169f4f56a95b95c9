//! Per-sample view of a track, expanded from its sample tables.
use crate::boxes::{ContainerBox, FourCC, Mp4};
use crate::error::{Error, Result};
use crate::leaf::{HdlrBox, MdhdBox, TkhdBox};
use crate::sample_table::{CttsBox, StcoBox, StscBox, StssBox, StszBox, SttsBox};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleInfo {
    /// 0-based sample index
    pub index: u32,

    /// Decode time (DTS) in track timescale units
    pub dts: u64,

    /// Duration in track timescale units (from stts)
    pub duration: u32,

    /// Composition offset in track timescale units (from ctts, 0 without one)
    pub composition_offset: i32,

    /// Byte offset in the file (from stsc + stco/co64)
    pub file_offset: u64,

    /// Sample size in bytes (from stsz)
    pub size: u32,

    /// 0-based chunk holding this sample
    pub chunk: u32,

    /// 1-based sample description index (from stsc)
    pub description_index: u32,

    /// Whether this sample is a sync sample / keyframe (from stss)
    pub is_sync: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackSamples {
    pub track_id: u32,
    pub handler_type: String, // "vide", "soun", etc.
    pub timescale: u32,
    pub duration: u64, // in track timescale units
    /// Whether the track carries an `stss` table. Without one every sample is a sync sample.
    pub has_sync_table: bool,
    pub samples: Vec<SampleInfo>,
}

pub fn track_samples_from_mp4(mp4: &Mp4) -> Result<Vec<TrackSamples>> {
    mp4.tracks().map(extract_track_samples).collect()
}

pub fn extract_track_samples(trak: &ContainerBox) -> Result<TrackSamples> {
    let track_id = trak.leaf::<TkhdBox>().map(|t| t.track_id).unwrap_or(0);
    let mdia = trak.container(b"mdia").ok_or(Error::MissingChild {
        enclosing: trak.typ(),
        missing: FourCC::new(b"mdia"),
    })?;
    let mdhd = mdia.leaf::<MdhdBox>().ok_or(Error::MissingChild {
        enclosing: mdia.typ(),
        missing: FourCC::new(b"mdhd"),
    })?;
    let handler_type = mdia
        .leaf::<HdlrBox>()
        .map(|h| h.handler_type.to_string())
        .unwrap_or_default();

    let stbl = mdia.container_path(&[b"minf", b"stbl"]);
    let samples = match stbl {
        Some(stbl) => build_sample_info(stbl)?,
        None => Vec::new(),
    };

    Ok(TrackSamples {
        track_id,
        handler_type,
        timescale: mdhd.timescale,
        duration: mdhd.duration,
        has_sync_table: stbl.is_some_and(|s| s.leaf::<StssBox>().is_some()),
        samples,
    })
}

fn malformed(typ: &[u8; 4], reason: String) -> Error {
    Error::malformed(FourCC::new(typ), reason)
}

/// Expand the sample tables of one `stbl`.
pub fn build_sample_info(stbl: &ContainerBox) -> Result<Vec<SampleInfo>> {
    let Some(stsz) = stbl.leaf::<StszBox>() else {
        if stbl.child(b"stz2").is_some() {
            return Err(malformed(b"stz2", "compact sample sizes are not supported".into()));
        }
        return Ok(Vec::new());
    };
    let n = if stsz.sample_size == 0 {
        stsz.entry_sizes.len()
    } else {
        stsz.sample_count as usize
    };
    if n == 0 {
        return Ok(Vec::new());
    }

    // stsz alone may claim any count; nothing is sized from it until the
    // other tables are known to describe that many samples.
    let stts = stbl
        .leaf::<SttsBox>()
        .ok_or_else(|| malformed(b"stbl", "samples without stts".into()))?;
    check_covers(b"stts", stts.sample_count(), n)?;
    let ctts = stbl.leaf::<CttsBox>();
    if let Some(ctts) = ctts {
        let total = ctts.entries.iter().map(|e| e.sample_count as u64).sum();
        check_covers(b"ctts", total, n)?;
    }
    let stsc = stbl
        .leaf::<StscBox>()
        .ok_or_else(|| malformed(b"stbl", "samples without stsc".into()))?;
    let stco = stbl
        .leaf::<StcoBox>()
        .ok_or_else(|| malformed(b"stbl", "samples without chunk offsets".into()))?;
    check_covers(b"stsc", chunk_capacity(stsc, stco.entries.len()), n)?;

    let durations = expand_stts(stts, n);
    let offsets = ctts.map(|c| expand_ctts(c, n));
    let sync = stbl.leaf::<StssBox>();

    let mut samples = Vec::with_capacity(n);
    let mut dts = 0u64;
    let mut next_sync = sync.map(|s| s.entries.iter().peekable());
    for i in 0..n {
        let number = i as u32 + 1;
        let is_sync = match next_sync.as_mut() {
            None => true,
            Some(it) => {
                while it.next_if(|&&s| s < number).is_some() {}
                it.next_if(|&&s| s == number).is_some()
            }
        };
        samples.push(SampleInfo {
            index: i as u32,
            dts,
            duration: durations[i],
            composition_offset: offsets.as_ref().map(|o| o[i]).unwrap_or(0),
            file_offset: 0,
            size: stsz.size_of(i).unwrap_or(0),
            chunk: 0,
            description_index: 0,
            is_sync,
        });
        dts = dts
            .checked_add(durations[i] as u64)
            .ok_or(Error::SizeOverflow("decode time exceeds 64 bits"))?;
    }

    place_in_chunks(&mut samples, stsc, stco)?;
    Ok(samples)
}

fn check_covers(typ: &[u8; 4], covered: u64, n: usize) -> Result<()> {
    if covered < n as u64 {
        return Err(malformed(typ, format!("covers {} of {} samples", covered, n)));
    }
    Ok(())
}

/// Number of samples the chunks described by `stsc` can hold.
fn chunk_capacity(stsc: &StscBox, chunk_count: usize) -> u64 {
    let mut total = 0u64;
    for (i, e) in stsc.entries.iter().enumerate() {
        let first = (e.first_chunk as usize).saturating_sub(1).min(chunk_count);
        let end = stsc
            .entries
            .get(i + 1)
            .map(|n| (n.first_chunk as usize).saturating_sub(1))
            .unwrap_or(chunk_count)
            .clamp(first, chunk_count);
        total = total.saturating_add((end - first) as u64 * e.samples_per_chunk as u64);
    }
    total
}

// Callers have checked that the table covers `n` samples.
fn expand_stts(stts: &SttsBox, n: usize) -> Vec<u32> {
    let mut v = Vec::with_capacity(n);
    for e in &stts.entries {
        let take = (e.sample_count as usize).min(n - v.len());
        v.extend(std::iter::repeat_n(e.sample_delta, take));
        if v.len() == n {
            break;
        }
    }
    v
}

fn expand_ctts(ctts: &CttsBox, n: usize) -> Vec<i32> {
    let mut v = Vec::with_capacity(n);
    for e in &ctts.entries {
        let take = (e.sample_count as usize).min(n - v.len());
        v.extend(std::iter::repeat_n(e.sample_offset, take));
        if v.len() == n {
            break;
        }
    }
    v
}

fn place_in_chunks(samples: &mut [SampleInfo], stsc: &StscBox, stco: &StcoBox) -> Result<()> {
    let chunk_count = stco.entries.len();
    let mut next = 0usize;
    'runs: for (i, e) in stsc.entries.iter().enumerate() {
        let first = (e.first_chunk as usize).saturating_sub(1);
        let end = stsc
            .entries
            .get(i + 1)
            .map(|n| (n.first_chunk as usize).saturating_sub(1))
            .unwrap_or(chunk_count)
            .min(chunk_count);
        for chunk in first..end {
            let mut off = stco.entries[chunk];
            for _ in 0..e.samples_per_chunk {
                let Some(s) = samples.get_mut(next) else {
                    break 'runs;
                };
                s.file_offset = off;
                s.chunk = chunk as u32;
                s.description_index = e.sample_description_index;
                off = off
                    .checked_add(s.size as u64)
                    .ok_or(Error::SizeOverflow("sample offset exceeds 64 bits"))?;
                next += 1;
            }
        }
    }
    if next < samples.len() {
        return Err(malformed(
            b"stsc",
            format!("chunks hold {} of {} samples", next, samples.len()),
        ));
    }
    Ok(())
}
