//! Time-based clipping.
//!
//! A clip is a new, self-contained file that starts at a requested time. The
//! sample tables of every track are sliced and re-pointed at a new `mdat`
//! whose payload is streamed from the original source, chunk by chunk, in
//! original file order. No media payload is decoded or re-encoded.
use crate::boxes::{BoxHeader, ContainerBox, FourCC, Mp4, Mp4Box};
use crate::error::{Error, Result};
use crate::known_boxes::KnownBox;
use crate::leaf::{count_u32, ElstBox, LeafBox, MdhdBox, MvhdBox};
use crate::sample_table::{
    CttsBox, CttsEntry, StcoBox, StscBox, StscEntry, StssBox, StszBox, SttsBox, SttsEntry,
};
use crate::samples::{extract_track_samples, SampleInfo};
use crate::source::ByteRangeSource;
use log::debug;
use std::io::{self, Write};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ClipOptions {
    /// Move the start of each track forward to its next sync sample when it
    /// has a sync table. Off by default: a track starts at the first sample
    /// decoding at or after the requested time.
    pub align_to_sync: bool,
}

/// A contiguous range of the source copied into the new `mdat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub offset: u64,
    pub len: u64,
}

/// A planned clip, ready to be written once.
pub struct Clip<'a> {
    boxes: Vec<Mp4Box>,
    mdat_header: BoxHeader,
    spans: Vec<ByteSpan>,
    source: &'a dyn ByteRangeSource,
}

/// Build a clip starting at `start` with default options.
pub fn build_clip<'a>(mp4: &Mp4, start: Duration, source: &'a dyn ByteRangeSource) -> Result<Clip<'a>> {
    build_clip_with(mp4, start, source, &ClipOptions::default())
}

// One source chunk (or the tail of one) kept in the clip.
#[derive(Debug, Clone, Copy)]
struct KeptChunk {
    offset: u64,
    len: u64,
    samples: u32,
    description_index: u32,
}

struct TrackPlan {
    trak_index: usize,
    track_id: u32,
    chunks: Vec<KeptChunk>,
    stts: SttsBox,
    ctts: Option<CttsBox>,
    stss: Option<StssBox>,
    stsz: StszBox,
    stsc: StscBox,
    media_duration: u64,
    movie_duration: u64,
    media_time: i64,
    // relative offset of each chunk inside the new mdat payload
    rel_offsets: Vec<u64>,
}

pub fn build_clip_with<'a>(
    mp4: &Mp4,
    start: Duration,
    source: &'a dyn ByteRangeSource,
    opts: &ClipOptions,
) -> Result<Clip<'a>> {
    let moov = mp4
        .movie()
        .ok_or_else(|| Error::malformed(FourCC::new(b"moov"), "file has no movie box"))?;
    let mvhd = moov.leaf::<MvhdBox>().ok_or(Error::MissingChild {
        enclosing: moov.typ(),
        missing: FourCC::new(b"mvhd"),
    })?;

    let mut plans = Vec::new();
    for (trak_index, trak) in moov.containers(b"trak").enumerate() {
        if let Some(plan) = plan_track(trak, trak_index, mvhd.timescale, start, opts)? {
            plans.push(plan);
        }
    }
    if plans.is_empty() {
        return Err(Error::EmptyClip);
    }

    for p in &plans {
        for c in &p.chunks {
            let end = c.offset.checked_add(c.len);
            if end.is_none_or(|end| end > source.size()) {
                return Err(Error::malformed(
                    FourCC::new(b"stco"),
                    format!("track {} chunk {}+{} is outside the source", p.track_id, c.offset, c.len),
                ));
            }
        }
    }

    let (spans, payload_len) = lay_out_chunks(&mut plans)?;
    let mdat_header = BoxHeader::for_payload(FourCC::new(b"mdat"), None, payload_len)?;

    let ftyp = mp4.boxes.iter().find(|b| b.typ() == b"ftyp").cloned();
    let ftyp_size = ftyp.as_ref().map(Mp4Box::size).unwrap_or(0);
    let max_rel = plans
        .iter()
        .flat_map(|p| p.rel_offsets.iter().copied())
        .max()
        .unwrap_or(0);

    // The moov size depends only on the offset width, never on the values.
    let mut large = false;
    let base = loop {
        let trial = build_moov(moov, &plans, 0, large)?;
        let base = ftyp_size
            .checked_add(trial.size())
            .and_then(|s| s.checked_add(mdat_header.header_size))
            .ok_or(Error::SizeOverflow("clip layout exceeds 64 bits"))?;
        let max_abs = base
            .checked_add(max_rel)
            .ok_or(Error::SizeOverflow("chunk offset exceeds 64 bits"))?;
        if !large && max_abs > u32::MAX as u64 {
            debug!("chunk offset {} needs co64, rebuilding", max_abs);
            large = true;
            continue;
        }
        break base;
    };
    let moov = build_moov(moov, &plans, base, large)?;

    let mut boxes = Vec::with_capacity(2);
    boxes.extend(ftyp);
    boxes.push(moov.into());

    Ok(Clip {
        boxes,
        mdat_header,
        spans,
        source,
    })
}

fn plan_track(
    trak: &ContainerBox,
    trak_index: usize,
    movie_timescale: u32,
    start: Duration,
    opts: &ClipOptions,
) -> Result<Option<TrackPlan>> {
    let track = extract_track_samples(trak)?;
    let timescale = track.timescale;
    if timescale == 0 {
        return Err(Error::malformed(FourCC::new(b"mdhd"), "zero timescale"));
    }

    let start_nanos = start.as_nanos();
    let first = track
        .samples
        .iter()
        .position(|s| s.dts as u128 * 1_000_000_000 >= start_nanos * timescale as u128);
    let first = match first {
        Some(i) if opts.align_to_sync && track.has_sync_table => {
            track.samples[i..].iter().position(|s| s.is_sync).map(|j| i + j)
        }
        other => other,
    };
    let Some(first) = first else {
        debug!("track {} has no samples after {:?}, dropping it", track.track_id, start);
        return Ok(None);
    };

    let kept = &track.samples[first..];
    debug!(
        "track {}: keeping samples {}..{} of {}",
        track.track_id,
        first + 1,
        track.samples.len(),
        track.samples.len()
    );

    let stbl = trak.container_path(&[b"mdia", b"minf", b"stbl"]);
    let orig_stts = stbl.and_then(|s| s.leaf::<SttsBox>());
    let orig_ctts = stbl.and_then(|s| s.leaf::<CttsBox>());
    let orig_stss = stbl.and_then(|s| s.leaf::<StssBox>());
    let orig_stsz = stbl.and_then(|s| s.leaf::<StszBox>());
    let orig_stsc = stbl.and_then(|s| s.leaf::<StscBox>());

    let stts = SttsBox {
        full: orig_stts.map(|b| b.full).unwrap_or_default(),
        entries: run_lengths(kept.iter().map(|s| s.duration))?
            .into_iter()
            .map(|(sample_count, sample_delta)| SttsEntry {
                sample_count,
                sample_delta,
            })
            .collect(),
    };

    let ctts = match orig_ctts {
        Some(orig) => Some(CttsBox {
            full: orig.full,
            entries: run_lengths(kept.iter().map(|s| s.composition_offset))?
                .into_iter()
                .map(|(sample_count, sample_offset)| CttsEntry {
                    sample_count,
                    sample_offset,
                })
                .collect(),
        }),
        None => None,
    };

    let stss = match orig_stss {
        Some(orig) => {
            let mut entries = Vec::new();
            for (i, s) in kept.iter().enumerate() {
                if s.is_sync {
                    entries.push(count_u32(i + 1)?);
                }
            }
            Some(StssBox {
                full: orig.full,
                entries,
            })
        }
        None => None,
    };

    let stsz = match orig_stsz {
        Some(orig) if orig.sample_size != 0 => StszBox {
            full: orig.full,
            sample_size: orig.sample_size,
            sample_count: count_u32(kept.len())?,
            entry_sizes: Vec::new(),
        },
        _ => {
            let mut b = StszBox::with_sizes(kept.iter().map(|s| s.size).collect())?;
            b.full = orig_stsz.map(|o| o.full).unwrap_or_default();
            b
        }
    };

    let chunks = group_chunks(kept)?;
    let mut stsc_entries: Vec<StscEntry> = Vec::new();
    for (i, c) in chunks.iter().enumerate() {
        let same = stsc_entries.last().is_some_and(|e| {
            e.samples_per_chunk == c.samples && e.sample_description_index == c.description_index
        });
        if !same {
            stsc_entries.push(StscEntry {
                first_chunk: count_u32(i + 1)?,
                samples_per_chunk: c.samples,
                sample_description_index: c.description_index,
            });
        }
    }
    let stsc = StscBox {
        full: orig_stsc.map(|b| b.full).unwrap_or_default(),
        entries: stsc_entries,
    };

    let media_duration = kept.iter().map(|s| s.duration as u64).sum::<u64>();
    let movie_duration = u64::try_from(media_duration as u128 * movie_timescale as u128 / timescale as u128)
        .map_err(|_| Error::SizeOverflow("track duration in movie timescale"))?;

    Ok(Some(TrackPlan {
        trak_index,
        track_id: track.track_id,
        chunks,
        stts,
        ctts,
        stss,
        stsz,
        stsc,
        media_duration,
        movie_duration,
        media_time: kept[0].composition_offset as i64,
        rel_offsets: Vec::new(),
    }))
}

/// Collapse consecutive equal values into `(count, value)` runs.
fn run_lengths<T: PartialEq + Copy>(values: impl IntoIterator<Item = T>) -> Result<Vec<(u32, T)>> {
    let mut runs: Vec<(u32, T)> = Vec::new();
    for v in values {
        match runs.last_mut() {
            Some((n, last)) if *last == v => {
                *n = n
                    .checked_add(1)
                    .ok_or(Error::SizeOverflow("run count does not fit in 32 bits"))?;
            }
            _ => runs.push((1, v)),
        }
    }
    Ok(runs)
}

/// Group kept samples by source chunk. The first group may start mid-chunk.
fn group_chunks(kept: &[SampleInfo]) -> Result<Vec<KeptChunk>> {
    let mut chunks: Vec<KeptChunk> = Vec::new();
    let mut current: Option<u32> = None;
    for s in kept {
        match chunks.last_mut() {
            Some(c) if current == Some(s.chunk) => {
                c.len = c
                    .len
                    .checked_add(s.size as u64)
                    .ok_or(Error::SizeOverflow("chunk length exceeds 64 bits"))?;
                c.samples += 1;
            }
            _ => {
                chunks.push(KeptChunk {
                    offset: s.file_offset,
                    len: s.size as u64,
                    samples: 1,
                    description_index: s.description_index,
                });
                current = Some(s.chunk);
            }
        }
    }
    Ok(chunks)
}

/// Order every kept chunk by source position, assign each its offset inside
/// the new payload and merge touching chunks into spans.
fn lay_out_chunks(plans: &mut [TrackPlan]) -> Result<(Vec<ByteSpan>, u64)> {
    let mut order: Vec<(u64, usize, usize)> = plans
        .iter()
        .enumerate()
        .flat_map(|(t, p)| p.chunks.iter().enumerate().map(move |(c, k)| (k.offset, t, c)))
        .collect();
    order.sort();

    for p in plans.iter_mut() {
        p.rel_offsets = vec![0; p.chunks.len()];
    }

    let mut spans: Vec<ByteSpan> = Vec::new();
    let mut rel = 0u64;
    for &(_, t, c) in &order {
        let chunk = plans[t].chunks[c];
        plans[t].rel_offsets[c] = rel;
        rel = rel
            .checked_add(chunk.len)
            .ok_or(Error::SizeOverflow("mdat payload exceeds 64 bits"))?;
        match spans.last_mut() {
            Some(last) if last.offset + last.len == chunk.offset => last.len += chunk.len,
            _ => spans.push(ByteSpan {
                offset: chunk.offset,
                len: chunk.len,
            }),
        }
    }
    debug!("{} chunks merged into {} spans, {} bytes", order.len(), spans.len(), rel);
    Ok((spans, rel))
}

fn build_moov(moov: &ContainerBox, plans: &[TrackPlan], base: u64, large: bool) -> Result<ContainerBox> {
    let max_duration = plans.iter().map(|p| p.movie_duration).max().unwrap_or(0);
    let mut children: Vec<Mp4Box> = Vec::with_capacity(moov.children().len());
    let mut trak_index = 0;
    for child in moov.children() {
        match child {
            Mp4Box::Leaf(LeafBox::Mvhd(mvhd)) => {
                let mut mvhd = mvhd.clone();
                mvhd.set_duration(max_duration);
                children.push(mvhd.into());
            }
            Mp4Box::Container(trak) if trak.typ() == b"trak" => {
                if let Some(plan) = plans.iter().find(|p| p.trak_index == trak_index) {
                    children.push(rebuild_trak(trak, plan, base, large)?.into());
                }
                trak_index += 1;
            }
            other => children.push(other.clone()),
        }
    }
    Ok(ContainerBox::new(moov.typ(), children))
}

fn rebuild_trak(trak: &ContainerBox, plan: &TrackPlan, base: u64, large: bool) -> Result<ContainerBox> {
    let mut children: Vec<Mp4Box> = Vec::with_capacity(trak.children().len());
    for child in trak.children() {
        match child {
            Mp4Box::Leaf(LeafBox::Tkhd(tkhd)) => {
                let mut tkhd = tkhd.clone();
                tkhd.set_duration(plan.movie_duration);
                children.push(tkhd.into());
            }
            Mp4Box::Container(edts) if edts.typ() == b"edts" => {
                let kids = edts
                    .children()
                    .iter()
                    .map(|c| match c {
                        Mp4Box::Leaf(LeafBox::Elst(_)) => {
                            ElstBox::single(plan.movie_duration, plan.media_time).into()
                        }
                        other => other.clone(),
                    })
                    .collect();
                children.push(ContainerBox::new(edts.typ(), kids).into());
            }
            Mp4Box::Container(mdia) if mdia.typ() == b"mdia" => {
                children.push(rebuild_mdia(mdia, plan, base, large)?.into());
            }
            other => children.push(other.clone()),
        }
    }
    Ok(ContainerBox::new(trak.typ(), children))
}

fn rebuild_mdia(mdia: &ContainerBox, plan: &TrackPlan, base: u64, large: bool) -> Result<ContainerBox> {
    let mut children: Vec<Mp4Box> = Vec::with_capacity(mdia.children().len());
    for child in mdia.children() {
        match child {
            Mp4Box::Leaf(LeafBox::Mdhd(mdhd)) => {
                let mut mdhd: MdhdBox = mdhd.clone();
                mdhd.set_duration(plan.media_duration);
                children.push(mdhd.into());
            }
            Mp4Box::Container(minf) if minf.typ() == b"minf" => {
                let mut kids: Vec<Mp4Box> = Vec::with_capacity(minf.children().len());
                for c in minf.children() {
                    match c {
                        Mp4Box::Container(stbl) if stbl.typ() == b"stbl" => {
                            kids.push(rebuild_stbl(stbl, plan, base, large)?.into());
                        }
                        other => kids.push(other.clone()),
                    }
                }
                children.push(ContainerBox::new(minf.typ(), kids).into());
            }
            other => children.push(other.clone()),
        }
    }
    Ok(ContainerBox::new(mdia.typ(), children))
}

fn rebuild_stbl(stbl: &ContainerBox, plan: &TrackPlan, base: u64, large: bool) -> Result<ContainerBox> {
    let mut offsets = Vec::with_capacity(plan.rel_offsets.len());
    for &rel in &plan.rel_offsets {
        offsets.push(
            base.checked_add(rel)
                .ok_or(Error::SizeOverflow("chunk offset exceeds 64 bits"))?,
        );
    }
    let mut offsets = Some(offsets);

    let mut children: Vec<Mp4Box> = Vec::with_capacity(stbl.children().len());
    for child in stbl.children() {
        let typ = child.typ();
        if KnownBox::from(typ).is_unsliceable_sample_box() {
            debug!("track {}: dropping {}", plan.track_id, typ);
            continue;
        }
        match &typ.0 {
            b"stts" => children.push(plan.stts.clone().into()),
            b"ctts" => children.extend(plan.ctts.clone().map(Mp4Box::from)),
            b"stss" => children.extend(plan.stss.clone().map(Mp4Box::from)),
            b"stsz" => children.push(plan.stsz.clone().into()),
            b"stsc" => children.push(plan.stsc.clone().into()),
            b"stco" | b"co64" => {
                if let Some(entries) = offsets.take() {
                    children.push(StcoBox::new(large, entries).into());
                }
            }
            _ => children.push(child.clone()),
        }
    }
    Ok(ContainerBox::new(stbl.typ(), children))
}

impl<'a> Clip<'a> {
    /// Structural boxes written ahead of the media data.
    pub fn boxes(&self) -> &[Mp4Box] {
        &self.boxes
    }

    pub fn spans(&self) -> &[ByteSpan] {
        &self.spans
    }

    pub fn mdat_header(&self) -> &BoxHeader {
        &self.mdat_header
    }

    /// Exact number of bytes `export` writes.
    pub fn size(&self) -> u64 {
        self.boxes
            .iter()
            .fold(self.mdat_header.size, |acc, b| acc.saturating_add(b.size()))
    }

    /// Write the clip and return the number of bytes written.
    pub fn export<W: Write + ?Sized>(self, w: &mut W) -> Result<u64> {
        let expected = self.size();
        let mut w = CountingWriter { inner: w, count: 0 };
        for b in &self.boxes {
            b.encode(&mut w)?;
        }
        self.mdat_header.write(&mut w)?;
        for span in &self.spans {
            let mut r = self.source.open_range(span.offset, span.len)?;
            let n = io::copy(&mut r, &mut w)?;
            if n != span.len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("span {}+{}: copied {} bytes", span.offset, span.len, n),
                )
                .into());
            }
        }
        if w.count != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("wrote {} bytes, planned {}", w.count, expected),
            )
            .into());
        }
        Ok(w.count)
    }
}

struct CountingWriter<'w, W: ?Sized> {
    inner: &'w mut W,
    count: u64,
}

impl<W: Write + ?Sized> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
