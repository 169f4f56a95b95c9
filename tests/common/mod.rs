#![allow(dead_code)]

use mp4clip::boxes::{BoxHeader, ContainerBox, FourCC, Mp4, Mp4Box, OpaqueBox};
use mp4clip::leaf::{ElstBox, FtypBox, FullHeader, HdlrBox, MdhdBox, MvhdBox, StsdBox, TkhdBox};
use mp4clip::sample_table::{
    CttsBox, CttsEntry, StcoBox, StscBox, StscEntry, StssBox, StszBox, SttsBox, SttsEntry,
};

pub fn cc(b: &[u8; 4]) -> FourCC {
    FourCC::new(b)
}

/// Description of one synthetic track.
#[derive(Clone, Debug)]
pub struct TrackSpec {
    pub track_id: u32,
    pub handler: [u8; 4],
    pub format: [u8; 4],
    pub timescale: u32,
    pub durations: Vec<u32>,
    pub sizes: Vec<u32>,
    pub samples_per_chunk: u32,
    pub sync: Option<Vec<u32>>,
    pub composition_offsets: Option<Vec<i32>>,
    pub edit_list: bool,
    /// Extra boxes appended to `stbl`.
    pub extra_stbl: Vec<Mp4Box>,
}

impl TrackSpec {
    pub fn new(track_id: u32, timescale: u32, durations: Vec<u32>, sizes: Vec<u32>) -> Self {
        assert_eq!(durations.len(), sizes.len());
        TrackSpec {
            track_id,
            handler: *b"vide",
            format: *b"avc1",
            timescale,
            durations,
            sizes,
            samples_per_chunk: 1,
            sync: None,
            composition_offsets: None,
            edit_list: false,
            extra_stbl: Vec::new(),
        }
    }

    pub fn media_duration(&self) -> u64 {
        self.durations.iter().map(|&d| d as u64).sum()
    }
}

/// Byte value every byte of a sample is filled with.
pub fn sample_fill(track: usize, sample: usize) -> u8 {
    ((track * 64 + sample) % 251) as u8
}

pub fn opaque(typ: &[u8; 4], data: Vec<u8>) -> Mp4Box {
    OpaqueBox {
        typ: cc(typ),
        uuid: None,
        data,
    }
    .into()
}

pub fn container(typ: &[u8; 4], children: Vec<Mp4Box>) -> Mp4Box {
    ContainerBox::new(cc(typ), children).into()
}

pub fn ftyp() -> Mp4Box {
    FtypBox {
        major_brand: cc(b"isom"),
        minor_version: 512,
        compatible_brands: vec![cc(b"isom"), cc(b"iso2"), cc(b"mp41")],
    }
    .into()
}

pub fn mvhd(timescale: u32, duration: u64) -> MvhdBox {
    MvhdBox {
        full: FullHeader::default(),
        creation_time: 0,
        modification_time: 0,
        timescale,
        duration,
        rest: vec![0; 80],
    }
}

/// Chunks of a track as (first sample, sample count).
pub fn chunks_of(spec: &TrackSpec) -> Vec<(usize, usize)> {
    let spc = spec.samples_per_chunk as usize;
    (0..spec.sizes.len())
        .step_by(spc)
        .map(|first| (first, spc.min(spec.sizes.len() - first)))
        .collect()
}

/// Chunks of all tracks, interleaved round robin, as (track, first sample, count).
pub fn chunk_order(tracks: &[TrackSpec]) -> Vec<(usize, usize, usize)> {
    let per_track: Vec<_> = tracks.iter().map(chunks_of).collect();
    let rounds = per_track.iter().map(Vec::len).max().unwrap_or(0);
    let mut order = Vec::new();
    for round in 0..rounds {
        for (t, chunks) in per_track.iter().enumerate() {
            if let Some(&(first, count)) = chunks.get(round) {
                order.push((t, first, count));
            }
        }
    }
    order
}

fn run_lengths<T: PartialEq + Copy>(values: &[T]) -> Vec<(u32, T)> {
    let mut runs: Vec<(u32, T)> = Vec::new();
    for &v in values {
        match runs.last_mut() {
            Some((n, last)) if *last == v => *n += 1,
            _ => runs.push((1, v)),
        }
    }
    runs
}

fn build_stbl(spec: &TrackSpec, offsets: &[u64], large: bool) -> Mp4Box {
    let mut entry = Vec::new();
    entry.extend_from_slice(&16u32.to_be_bytes());
    entry.extend_from_slice(&spec.format);
    entry.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
    let mut stsd_data = 1u32.to_be_bytes().to_vec();
    stsd_data.extend_from_slice(&entry);

    let mut kids: Vec<Mp4Box> = vec![StsdBox {
        full: FullHeader::default(),
        data: stsd_data,
    }
    .into()];

    kids.push(
        SttsBox {
            full: FullHeader::default(),
            entries: run_lengths(&spec.durations)
                .into_iter()
                .map(|(sample_count, sample_delta)| SttsEntry {
                    sample_count,
                    sample_delta,
                })
                .collect(),
        }
        .into(),
    );

    if let Some(offs) = &spec.composition_offsets {
        kids.push(
            CttsBox {
                full: FullHeader::default(),
                entries: run_lengths(offs)
                    .into_iter()
                    .map(|(sample_count, sample_offset)| CttsEntry {
                        sample_count,
                        sample_offset,
                    })
                    .collect(),
            }
            .into(),
        );
    }

    if let Some(sync) = &spec.sync {
        kids.push(
            StssBox {
                full: FullHeader::default(),
                entries: sync.clone(),
            }
            .into(),
        );
    }

    let n = spec.sizes.len() as u32;
    let spc = spec.samples_per_chunk;
    let full_chunks = n / spc;
    let tail = n % spc;
    let mut stsc = Vec::new();
    if full_chunks > 0 {
        stsc.push(StscEntry {
            first_chunk: 1,
            samples_per_chunk: spc,
            sample_description_index: 1,
        });
    }
    if tail > 0 {
        stsc.push(StscEntry {
            first_chunk: full_chunks + 1,
            samples_per_chunk: tail,
            sample_description_index: 1,
        });
    }
    kids.push(
        StscBox {
            full: FullHeader::default(),
            entries: stsc,
        }
        .into(),
    );

    kids.push(StszBox::with_sizes(spec.sizes.clone()).unwrap().into());
    kids.push(StcoBox::new(large, offsets.to_vec()).into());
    kids.extend(spec.extra_stbl.iter().cloned());

    container(b"stbl", kids)
}

fn build_trak(spec: &TrackSpec, movie_timescale: u32, offsets: &[u64], large: bool) -> Mp4Box {
    let media_duration = spec.media_duration();
    let movie_duration = media_duration * movie_timescale as u64 / spec.timescale as u64;

    let mut kids: Vec<Mp4Box> = vec![TkhdBox {
        full: FullHeader {
            version: 0,
            flags: 7,
        },
        creation_time: 0,
        modification_time: 0,
        track_id: spec.track_id,
        reserved: 0,
        duration: movie_duration,
        rest: vec![0; 60],
    }
    .into()];

    if spec.edit_list {
        kids.push(container(
            b"edts",
            vec![ElstBox::single(movie_duration, 0).into()],
        ));
    }

    let media_header = if &spec.handler == b"soun" {
        opaque(b"smhd", vec![0; 8])
    } else {
        opaque(b"vmhd", vec![0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0])
    };
    let dref = opaque(
        b"dref",
        vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 12, b'u', b'r', b'l', b' ', 0, 0, 0, 1],
    );

    kids.push(container(
        b"mdia",
        vec![
            MdhdBox {
                full: FullHeader::default(),
                creation_time: 0,
                modification_time: 0,
                timescale: spec.timescale,
                duration: media_duration,
                language: 0x55c4,
                pre_defined: 0,
            }
            .into(),
            HdlrBox {
                full: FullHeader::default(),
                pre_defined: 0,
                handler_type: FourCC(spec.handler),
                reserved: [0; 12],
                name: b"synthetic\0".to_vec(),
            }
            .into(),
            container(
                b"minf",
                vec![
                    media_header,
                    container(b"dinf", vec![dref]),
                    build_stbl(spec, offsets, large),
                ],
            ),
        ],
    ));

    container(b"trak", kids)
}

pub fn build_moov(tracks: &[TrackSpec], movie_timescale: u32, offsets: &[Vec<u64>], large: bool) -> Mp4Box {
    let duration = tracks
        .iter()
        .map(|t| t.media_duration() * movie_timescale as u64 / t.timescale as u64)
        .max()
        .unwrap_or(0);
    let mut kids: Vec<Mp4Box> = vec![mvhd(movie_timescale, duration).into()];
    for (t, spec) in tracks.iter().enumerate() {
        kids.push(build_trak(spec, movie_timescale, &offsets[t], large));
    }
    container(b"moov", kids)
}

/// `ftyp`, `moov` and the `mdat` header of a synthetic file, plus the
/// length of the `mdat` payload that follows it.
pub fn build_head(tracks: &[TrackSpec], movie_timescale: u32) -> (Vec<u8>, u64) {
    let mut rel: Vec<Vec<u64>> = vec![Vec::new(); tracks.len()];
    let mut pos = 0u64;
    for (t, first, count) in chunk_order(tracks) {
        rel[t].push(pos);
        pos += tracks[t].sizes[first..first + count]
            .iter()
            .map(|&s| s as u64)
            .sum::<u64>();
    }
    let payload = pos;
    let max_rel = rel.iter().flatten().copied().max().unwrap_or(0);

    let ftyp = ftyp();
    let mdat = BoxHeader::for_payload(cc(b"mdat"), None, payload).unwrap();
    let mut large = false;
    let mut base = ftyp.size() + build_moov(tracks, movie_timescale, &rel, false).size() + mdat.header_size;
    if base + max_rel > u32::MAX as u64 {
        large = true;
        base = ftyp.size() + build_moov(tracks, movie_timescale, &rel, true).size() + mdat.header_size;
    }

    let abs: Vec<Vec<u64>> = rel
        .iter()
        .map(|offs| offs.iter().map(|o| o + base).collect())
        .collect();
    let moov = build_moov(tracks, movie_timescale, &abs, large);

    let mut head = Vec::new();
    ftyp.encode(&mut head).unwrap();
    moov.encode(&mut head).unwrap();
    mdat.write(&mut head).unwrap();
    assert_eq!(head.len() as u64, base);
    (head, payload)
}

/// A complete synthetic file with interleaved chunks.
pub fn build_file(tracks: &[TrackSpec], movie_timescale: u32) -> Vec<u8> {
    let (mut out, _) = build_head(tracks, movie_timescale);
    for (t, first, count) in chunk_order(tracks) {
        for s in first..first + count {
            let size = tracks[t].sizes[s] as usize;
            out.extend(std::iter::repeat_n(sample_fill(t, s), size));
        }
    }
    out
}

/// Ten one-second samples at timescale 1, one sample per chunk.
pub fn ten_second_track() -> TrackSpec {
    TrackSpec::new(1, 1, vec![1; 10], (0..10).map(|i| 100 + i).collect())
}

/// Rebuild a tree bottom-up, passing every box (containers after their
/// children) through `f`.
pub fn rewrite_boxes(b: Mp4Box, f: &dyn Fn(Mp4Box) -> Mp4Box) -> Mp4Box {
    match b {
        Mp4Box::Container(c) => {
            let typ = c.typ();
            let kids = c.into_children().into_iter().map(|k| rewrite_boxes(k, f)).collect();
            f(ContainerBox::new(typ, kids).into())
        }
        other => f(other),
    }
}

/// Re-encode a decoded file after rewriting it with [`rewrite_boxes`].
pub fn rewrite_file(mp4: Mp4, f: &dyn Fn(Mp4Box) -> Mp4Box) -> Vec<u8> {
    let mut out = Vec::new();
    for b in mp4.boxes {
        rewrite_boxes(b, f).encode(&mut out).unwrap();
    }
    out
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("mp4clip_{}_{}", std::process::id(), name))
}
