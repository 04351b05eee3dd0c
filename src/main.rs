use crossbeam::channel::{self, Receiver, Sender};
use raylib::prelude::*;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use trailer_uploader::config::Config;
use trailer_uploader::init;
use trailer_uploader::pipeline::{self, RunOptions, WorkDirs};
use trailer_uploader::platform;
use trailer_uploader::set_log_hook;

const CONFIG_PATH: &str = "config.json";
const LOG_MAX_LINES: usize = 300;
const LOG_LINE_MAX: usize = 600;
const INPUT_MAX_CHARS: usize = 8000;

const COLOR_BG: Color = Color::new(25, 25, 25, 255);
const COLOR_BTN: Color = Color::new(40, 90, 170, 255);
const COLOR_BTN_HOVER: Color = Color::new(70, 120, 200, 255);
const COLOR_BTN_DISABLED: Color = Color::new(60, 60, 60, 255);
const COLOR_LOG_BG: Color = Color::new(18, 18, 18, 255);
const COLOR_LOG_TEXT: Color = Color::new(210, 210, 210, 255);
const COLOR_INPUT_BG: Color = Color::new(32, 32, 36, 255);

struct AppState {
    running: Arc<AtomicBool>,
    status: Arc<Mutex<String>>,
    log_tx: Sender<String>,
    log_rx: Receiver<String>,
    log_lines: Vec<String>,
    input: String,
}

fn push_log_line(lines: &mut Vec<String>, line: String) {
    if lines.len() >= LOG_MAX_LINES {
        let excess = lines.len() + 1 - LOG_MAX_LINES;
        lines.drain(0..excess);
    }
    let mut text = line;
    if text.len() > LOG_LINE_MAX {
        let mut cut = LOG_LINE_MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    lines.push(text);
}

fn draw_button(
    d: &mut RaylibDrawHandle,
    rect: Rectangle,
    label: &str,
    enabled: bool,
    font_size: f32,
) -> bool {
    let mouse = d.get_mouse_position();
    let hot = rect.check_collision_point_rec(mouse);

    let bg = if !enabled {
        COLOR_BTN_DISABLED
    } else if hot {
        COLOR_BTN_HOVER
    } else {
        COLOR_BTN
    };

    d.draw_rectangle_rounded(rect, 0.25, 10, bg);
    d.draw_rectangle_rounded_lines(rect, 0.25, 10, Color::new(20, 20, 20, 255));

    let ts = d.measure_text(label, font_size as i32);
    let pos_x = rect.x + (rect.width - ts as f32) * 0.5;
    let pos_y = rect.y + (rect.height - font_size) * 0.5;

    d.draw_text(label, pos_x as i32, pos_y as i32, font_size as i32, Color::RAYWHITE);

    enabled && hot && d.is_mouse_button_released(MouseButton::MOUSE_BUTTON_LEFT)
}

fn draw_text_lines(
    d: &mut RaylibDrawHandle,
    rect: Rectangle,
    lines: &[&str],
    font_size: i32,
    color: Color,
) {
    let pad = 8.0;
    let line_h = font_size as f32 + 2.0;
    let max_lines = ((rect.height - 2.0 * pad) / line_h).floor().max(1.0) as usize;
    let start = lines.len().saturating_sub(max_lines);

    let mut y = rect.y + pad;
    for line in lines.iter().skip(start) {
        d.draw_text(line, (rect.x + pad) as i32, y as i32, font_size, color);
        y += line_h;
    }
}

fn draw_log_panel(d: &mut RaylibDrawHandle, rect: Rectangle, lines: &[String]) {
    d.draw_rectangle_rec(rect, COLOR_LOG_BG);
    d.draw_rectangle_lines_ex(rect, 2.0, Color::new(40, 40, 40, 255));
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    draw_text_lines(d, rect, &lines, 14, COLOR_LOG_TEXT);
}

fn draw_title_input(d: &mut RaylibDrawHandle, rect: Rectangle, input: &str, caret_on: bool) {
    d.draw_rectangle_rec(rect, COLOR_INPUT_BG);
    d.draw_rectangle_lines_ex(rect, 2.0, Color::new(70, 70, 80, 255));

    let mut shown = input.to_string();
    if caret_on {
        shown.push('_');
    }
    if input.is_empty() && !caret_on {
        shown = "One movie title per line".to_string();
    }
    let lines: Vec<&str> = shown.split('\n').collect();
    draw_text_lines(d, rect, &lines, 18, Color::RAYWHITE);
}

/// Typing, Backspace, Enter for a new line, Ctrl+V to paste.
fn handle_text_input(rl: &mut RaylibHandle, input: &mut String) {
    while let Some(ch) = rl.get_char_pressed() {
        if !ch.is_control() && input.chars().count() < INPUT_MAX_CHARS {
            input.push(ch);
        }
    }

    if rl.is_key_pressed(KeyboardKey::KEY_BACKSPACE)
        || rl.is_key_pressed_repeat(KeyboardKey::KEY_BACKSPACE)
    {
        input.pop();
    }
    if rl.is_key_pressed(KeyboardKey::KEY_ENTER) || rl.is_key_pressed(KeyboardKey::KEY_KP_ENTER) {
        input.push('\n');
    }

    let ctrl = rl.is_key_down(KeyboardKey::KEY_LEFT_CONTROL)
        || rl.is_key_down(KeyboardKey::KEY_RIGHT_CONTROL)
        || rl.is_key_down(KeyboardKey::KEY_LEFT_SUPER);
    if ctrl && rl.is_key_pressed(KeyboardKey::KEY_V) {
        if let Ok(text) = rl.get_clipboard_text() {
            let text = text.replace("\r\n", "\n").replace('\r', "\n");
            let room = INPUT_MAX_CHARS.saturating_sub(input.chars().count());
            input.extend(text.chars().take(room));
        }
    }
}

fn start_batch_thread(state: &AppState, titles: Vec<String>) {
    if state.running.load(Ordering::SeqCst) {
        return;
    }

    state.running.store(true, Ordering::SeqCst);
    if let Ok(mut status) = state.status.lock() {
        *status = format!("Running {} title(s)...", titles.len());
    }

    let running = Arc::clone(&state.running);
    let status = Arc::clone(&state.status);
    let log_tx = state.log_tx.clone();

    std::thread::spawn(move || {
        let hook_tx = log_tx.clone();
        let hook = Arc::new(Mutex::new(move |line: &str| {
            let _ = hook_tx.send(line.to_string());
        }));
        set_log_hook(Some(hook));

        let summary = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(async {
                let cfg = Config::load(CONFIG_PATH).await?;
                pipeline::run_batch(&cfg, &titles, RunOptions::default()).await
            }),
            Err(err) => Err(anyhow::Error::new(err).context("Failed to initialize async runtime")),
        };

        let line = match summary {
            Ok(report) => report.summary(),
            Err(err) => {
                let _ = log_tx.send(format!("[ERROR] {:#}", err));
                "Batch aborted; see log".to_string()
            }
        };
        if let Ok(mut guard) = status.lock() {
            *guard = line;
        }

        set_log_hook(None);
        running.store(false, Ordering::SeqCst);
    });
}

fn load_work_dirs(rt: &tokio::runtime::Runtime) -> WorkDirs {
    rt.block_on(async {
        let cfg = match Config::load(CONFIG_PATH).await {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::error!("{}", err);
                Config::default()
            }
        };
        let dirs = WorkDirs::under(&cfg.work_root);
        if let Err(err) = init::ensure_directories(&dirs).await {
            tracing::error!("Failed to create directories: {:#}", err);
        }
        if !init::check_ffmpeg().await {
            tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
        }
        if !init::check_ytdlp().await {
            tracing::warn!("yt-dlp not found in PATH. Trailer downloads will fail.");
        }
        dirs
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create async runtime");
    let dirs = load_work_dirs(&rt);
    drop(rt);

    let (mut rl, thread) = raylib::init()
        .size(980, 620)
        .resizable()
        .title("Trailer Uploader")
        .build();
    rl.set_target_fps(60);

    let (log_tx, log_rx) = channel::unbounded();
    let mut state = AppState {
        running: Arc::new(AtomicBool::new(false)),
        status: Arc::new(Mutex::new("Idle".to_string())),
        log_tx,
        log_rx,
        log_lines: Vec::with_capacity(LOG_MAX_LINES),
        input: String::new(),
    };
    let mut frame: u64 = 0;

    while !rl.window_should_close() {
        frame = frame.wrapping_add(1);
        let running = state.running.load(Ordering::SeqCst);
        if !running {
            handle_text_input(&mut rl, &mut state.input);
        }
        while let Ok(line) = state.log_rx.try_recv() {
            push_log_line(&mut state.log_lines, line);
        }

        let mut d = rl.begin_drawing(&thread);
        d.clear_background(COLOR_BG);

        d.draw_text("Movie titles", 30, 20, 24, Color::RAYWHITE);
        draw_title_input(
            &mut d,
            Rectangle::new(30.0, 60.0, 300.0, 250.0),
            &state.input,
            !running && (frame / 30) % 2 == 0,
        );

        let titles = pipeline::split_titles(&state.input);
        let can_start = !running && !titles.is_empty();
        let start_label = if running { "RUNNING..." } else { "PROCESS MOVIES" };
        if draw_button(
            &mut d,
            Rectangle::new(30.0, 325.0, 300.0, 60.0),
            start_label,
            can_start,
            22.0,
        ) {
            state.log_lines.clear();
            start_batch_thread(&state, titles);
        }

        let folders = [
            ("Open Downloads", &dirs.downloads),
            ("Open Edited Videos", &dirs.edited_videos),
            ("Open Enhanced Videos", &dirs.enhanced_videos),
            ("Open Thumbnails", &dirs.thumbnails),
        ];
        for (i, (label, path)) in folders.iter().enumerate() {
            let x = 30.0 + (i % 2) as f32 * 152.0;
            let y = 400.0 + (i / 2) as f32 * 50.0;
            if draw_button(&mut d, Rectangle::new(x, y, 148.0, 40.0), label, true, 14.0) {
                platform::open_folder(path);
            }
        }

        let status = state
            .status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone());
        d.draw_text(&format!("Status: {}", status), 30, 510, 16, Color::new(220, 220, 220, 255));

        d.draw_text("Log", 360, 20, 24, Color::RAYWHITE);
        draw_log_panel(
            &mut d,
            Rectangle::new(360.0, 60.0, 590.0, 530.0),
            &state.log_lines,
        );
    }
}
