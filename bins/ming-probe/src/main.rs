//! ming-probe - MP3 流探测工具
//!
//! 逐帧走查 MP3 位流前端, 报告流几何与帧统计:
//! 版本/采样率/声道模式、帧数、估算时长、VBR 与 ID3v2 标签情况.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, warn};
use serde::Serialize;
use std::process;

use ming_codec::mp3::{ChannelMode, Mp3FrameReader, MpegVersion};

/// Ming MP3 流探测工具
#[derive(Parser, Debug)]
#[command(name = "ming-probe", version, about = "纯 Rust MP3 位流探测工具")]
struct Cli {
    /// 输入文件路径
    input: String,

    /// 逐帧打印帧信息
    #[arg(long)]
    show_frames: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 帧级错误容忍上限, 超过即中止
    #[arg(long, default_value_t = 8)]
    max_errors: u32,
}

/// 探测结果
#[derive(Serialize)]
struct ProbeOutput {
    filename: String,
    version: String,
    sample_rate: u32,
    channel_mode: String,
    frames: u64,
    /// 按帧几何估算的时长 (秒)
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    /// 首帧码率 (bps); VBR 流仅供参考
    bitrate: u32,
    vbr: bool,
    id3v2_bytes: usize,
    errors: u32,
}

fn version_name(version: MpegVersion) -> &'static str {
    match version {
        MpegVersion::Mpeg1 => "MPEG-1",
        MpegVersion::Mpeg2 => "MPEG-2",
        MpegVersion::Mpeg25 => "MPEG-2.5",
    }
}

fn mode_name(mode: ChannelMode) -> &'static str {
    match mode {
        ChannelMode::Stereo => "stereo",
        ChannelMode::JointStereo => "joint-stereo",
        ChannelMode::DualChannel => "dual-channel",
        ChannelMode::SingleChannel => "mono",
    }
}

fn probe(cli: &Cli) -> Result<ProbeOutput> {
    let mut reader =
        Mp3FrameReader::open(&cli.input).with_context(|| format!("无法打开 {}", cli.input))?;
    let id3v2_bytes = reader.id3v2_tag().map_or(0, |tag| tag.len());

    let mut frames = 0u64;
    let mut errors = 0u32;
    let mut version = MpegVersion::Mpeg1;
    let mut sample_rate = 0u32;
    let mut mode = ChannelMode::Stereo;
    let mut bitrate = 0u32;
    let mut vbr = false;
    let mut samples_per_frame = 0u64;

    loop {
        match reader.read_frame() {
            Ok(Some(header)) => {
                if frames == 0 {
                    version = header.version();
                    sample_rate = header.frequency();
                    mode = header.mode();
                    bitrate = header.bitrate();
                    vbr = header.vbr();
                    samples_per_frame = u64::from(header.samples_per_frame());
                }
                if cli.show_frames {
                    println!(
                        "帧 {frames}: {} 字节, {} bps, 子带 {}, 槽位 {}",
                        header.frame_size(),
                        header.bitrate(),
                        header.number_of_subbands(),
                        header.slots()
                    );
                }
                frames += 1;
                reader.close_frame();
            }
            Ok(None) => break,
            Err(e) => {
                errors += 1;
                warn!("帧 {frames} 解析失败: {e}");
                if errors > cli.max_errors {
                    anyhow::bail!("错误数超过上限 ({}): {e}", cli.max_errors);
                }
                reader.close_frame();
            }
        }
    }
    debug!("共读取 {frames} 帧, {errors} 个错误");

    let duration = (sample_rate > 0 && frames > 0)
        .then(|| (frames * samples_per_frame) as f64 / f64::from(sample_rate));

    Ok(ProbeOutput {
        filename: cli.input.clone(),
        version: version_name(version).to_string(),
        sample_rate,
        channel_mode: mode_name(mode).to_string(),
        frames,
        duration,
        bitrate,
        vbr,
        id3v2_bytes,
        errors,
    })
}

fn print_text(out: &ProbeOutput) {
    println!("输入: {}", out.filename);
    println!(
        "格式: {} Layer III, {} Hz, {}",
        out.version, out.sample_rate, out.channel_mode
    );
    println!(
        "帧数: {}{}",
        out.frames,
        out.duration
            .map_or(String::new(), |d| format!(" (约 {d:.2} 秒)"))
    );
    println!(
        "码率: {} kbps{}",
        out.bitrate / 1000,
        if out.vbr { " (VBR)" } else { "" }
    );
    if out.id3v2_bytes > 0 {
        println!("ID3v2: {} 字节", out.id3v2_bytes);
    }
    if out.errors > 0 {
        println!("错误: {}", out.errors);
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match probe(&cli) {
        Ok(out) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&out).unwrap());
            } else {
                print_text(&out);
            }
        }
        Err(e) => {
            eprintln!("探测失败: {e:#}");
            process::exit(1);
        }
    }
}
