//! The fantasy console: a reference host layering a pixel display,
//! tone queue, and key-state input over the conversation VM.
//!
//! The console owns plain state only. Putting the buffer on an actual
//! screen, playing the tone queue, and pacing frames are the embedder's
//! business; headless tests drive the same surface.

use std::collections::BTreeSet;

use crate::vm::imports::{pop_args, ImportHost, StandardImports};
use crate::vm::machine::{Vm, VmError};

pub const SCREEN_WIDTH: i32 = 128;
pub const SCREEN_HEIGHT: i32 = 128;

/// The fixed 16-color palette, RGB.
pub const PALETTE: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (255, 255, 255),
    (255, 0, 0),
    (0, 255, 0),
    (0, 0, 255),
    (255, 255, 0),
    (255, 0, 255),
    (0, 255, 255),
    (128, 128, 128),
    (192, 192, 192),
    (128, 0, 0),
    (0, 128, 0),
    (0, 0, 128),
    (128, 128, 0),
    (128, 0, 128),
    (0, 128, 128),
];

/// Key codes the input imports understand.
pub mod keys {
    pub const UP: u16 = 0;
    pub const DOWN: u16 = 1;
    pub const LEFT: u16 = 2;
    pub const RIGHT: u16 = 3;
    pub const SPACE: u16 = 4;
    pub const RETURN: u16 = 5;
    pub const ESCAPE: u16 = 6;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency: u16,
    pub duration_ms: u16,
    pub channel: u16,
}

pub struct Console {
    display: Vec<u8>,
    imports: StandardImports,
    keys_down: BTreeSet<u16>,
    keys_previous: BTreeSet<u16>,
    tones: Vec<Tone>,
    delays_ms: Vec<u16>,
    flip_requested: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    #[must_use]
    pub fn new() -> Self {
        Self {
            display: vec![0; (SCREEN_WIDTH * SCREEN_HEIGHT) as usize],
            imports: StandardImports::new(),
            keys_down: BTreeSet::new(),
            keys_previous: BTreeSet::new(),
            tones: Vec::new(),
            delays_ms: Vec::new(),
            flip_requested: false,
        }
    }

    #[must_use]
    pub fn with_imports(imports: StandardImports) -> Self {
        Self {
            imports,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn imports(&self) -> &StandardImports {
        &self.imports
    }

    pub fn imports_mut(&mut self) -> &mut StandardImports {
        &mut self.imports
    }

    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> u8 {
        self.display[(y * SCREEN_WIDTH + x) as usize]
    }

    fn plot(&mut self, x: i32, y: i32, color: u8) {
        if (0..SCREEN_WIDTH).contains(&x) && (0..SCREEN_HEIGHT).contains(&y) {
            self.display[(y * SCREEN_WIDTH + x) as usize] = color;
        }
    }

    /// Feed the key state for the coming frame; the previous frame's
    /// state backs the key_released query.
    pub fn begin_frame(&mut self, keys_down: impl IntoIterator<Item = u16>) {
        self.keys_previous = std::mem::take(&mut self.keys_down);
        self.keys_down = keys_down.into_iter().collect();
    }

    /// Whether a flip was requested since the last call.
    pub fn take_flip_request(&mut self) -> bool {
        std::mem::take(&mut self.flip_requested)
    }

    #[must_use]
    pub fn tones(&self) -> &[Tone] {
        &self.tones
    }

    pub fn take_tones(&mut self) -> Vec<Tone> {
        std::mem::take(&mut self.tones)
    }

    /// Delay requests (milliseconds) accumulated since the last take.
    pub fn take_delays(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.delays_ms)
    }

    fn arg_values(vm: &mut Vm, expected: usize) -> Result<Option<Vec<u16>>, VmError> {
        let addresses = pop_args(vm)?;
        if addresses.len() < expected {
            log::warn!(
                "console import called with {} of {expected} arguments",
                addresses.len()
            );
            return Ok(None);
        }
        Ok(Some(
            addresses.iter().map(|&addr| vm.get_mem(addr)).collect(),
        ))
    }

    fn clear(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let addresses = pop_args(vm)?;
        let color = addresses
            .first()
            .map_or(0, |&addr| (vm.get_mem(addr) & 0xF) as u8);
        self.display.fill(color);
        vm.set_result_register(1);
        Ok(())
    }

    fn set_pixel(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 3)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let (x, y, color) = (args[0] as i16, args[1] as i16, (args[2] & 0xF) as u8);
        self.plot(i32::from(x), i32::from(y), color);
        vm.set_result_register(1);
        Ok(())
    }

    fn line(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 5)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let clamp_x = |v: i16| i32::from(v).clamp(0, SCREEN_WIDTH - 1);
        let clamp_y = |v: i16| i32::from(v).clamp(0, SCREEN_HEIGHT - 1);
        let (mut x1, mut y1) = (clamp_x(args[0] as i16), clamp_y(args[1] as i16));
        let (x2, y2) = (clamp_x(args[2] as i16), clamp_y(args[3] as i16));
        let color = (args[4] & 0xF) as u8;

        let dx = (x2 - x1).abs();
        let dy = (y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx - dy;
        loop {
            self.plot(x1, y1, color);
            if x1 == x2 && y1 == y2 {
                break;
            }
            let doubled = 2 * err;
            if doubled > -dy {
                err -= dy;
                x1 += sx;
            }
            if doubled < dx {
                err += dx;
                y1 += sy;
            }
        }
        vm.set_result_register(1);
        Ok(())
    }

    fn rect(&mut self, vm: &mut Vm, filled: bool) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 5)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let x = i32::from(args[0] as i16);
        let y = i32::from(args[1] as i16);
        let width = i32::from(args[2] as i16).max(1);
        let height = i32::from(args[3] as i16).max(1);
        let color = (args[4] & 0xF) as u8;

        if filled {
            for py in y..y + height {
                for px in x..x + width {
                    self.plot(px, py, color);
                }
            }
        } else {
            for px in x..x + width {
                self.plot(px, y, color);
                self.plot(px, y + height - 1, color);
            }
            for py in y..y + height {
                self.plot(x, py, color);
                self.plot(x + width - 1, py, color);
            }
        }
        vm.set_result_register(1);
        Ok(())
    }

    fn circle(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 4)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let x = i32::from(args[0] as i16);
        let y = i32::from(args[1] as i16);
        let radius = i32::from(args[2] as i16);
        let color = (args[3] & 0xF) as u8;

        // Midpoint circle.
        let mut f = 1 - radius;
        let mut ddf_x = 1;
        let mut ddf_y = -2 * radius;
        let mut dx = 0;
        let mut dy = radius;

        self.plot(x, y + radius, color);
        self.plot(x, y - radius, color);
        self.plot(x + radius, y, color);
        self.plot(x - radius, y, color);

        while dx < dy {
            if f >= 0 {
                dy -= 1;
                ddf_y += 2;
                f += ddf_y;
            }
            dx += 1;
            ddf_x += 2;
            f += ddf_x;

            self.plot(x + dx, y + dy, color);
            self.plot(x - dx, y + dy, color);
            self.plot(x + dx, y - dy, color);
            self.plot(x - dx, y - dy, color);
            self.plot(x + dy, y + dx, color);
            self.plot(x - dy, y + dx, color);
            self.plot(x + dy, y - dx, color);
            self.plot(x - dy, y - dx, color);
        }
        vm.set_result_register(1);
        Ok(())
    }

    fn sprite(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 3)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let x = i32::from(args[0] as i16);
        let y = i32::from(args[1] as i16);
        let data = args[2];

        let width = i32::from(vm.get_mem(data) as i16);
        let height = i32::from(vm.get_mem(data.wrapping_add(1)) as i16);
        if !(1..=64).contains(&width) || !(1..=64).contains(&height) {
            log::warn!("sprite with invalid dimensions {width}x{height}");
            vm.set_result_register(0);
            return Ok(());
        }

        let mut cursor = data.wrapping_add(2);
        for sy in 0..height {
            for sx in 0..width {
                let color = (vm.get_mem(cursor) & 0xF) as u8;
                cursor = cursor.wrapping_add(1);
                // Color 0 is transparent.
                if color != 0 {
                    self.plot(x + sx, y + sy, color);
                }
            }
        }
        vm.set_result_register(1);
        Ok(())
    }

    fn print(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 4)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let x = i32::from(args[0] as i16);
        let y = i32::from(args[1] as i16);
        let text = vm.get_string(args[2]);
        let color = (args[3] & 0xF) as u8;

        // There is no font; mark the text's footprint and record it.
        for (index, _) in text.chars().enumerate() {
            self.plot(x + index as i32, y, color);
        }
        vm.emit_line(text);
        vm.set_result_register(1);
        Ok(())
    }

    fn flip(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        pop_args(vm)?;
        self.flip_requested = true;
        vm.set_result_register(1);
        Ok(())
    }

    fn play_tone(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 3)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        self.tones.push(Tone {
            frequency: args[0],
            duration_ms: args[1],
            channel: args[2] % 4,
        });
        vm.set_result_register(1);
        Ok(())
    }

    fn key_query(&mut self, vm: &mut Vm, released: bool) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 1)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let code = args[0];
        let hit = if released {
            self.keys_previous.contains(&code) && !self.keys_down.contains(&code)
        } else {
            self.keys_down.contains(&code)
        };
        vm.set_result_register(u16::from(hit));
        Ok(())
    }

    fn trig(vm: &mut Vm, f: impl Fn(f64) -> f64) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 1)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let degrees = f64::from(args[0] as i16);
        let scaled = (f(degrees.to_radians()) * 100.0) as i16;
        vm.set_result_register(scaled as u16);
        Ok(())
    }

    fn sqrt(vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 1)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        let value = args[0] as i16;
        let root = if value < 0 {
            0
        } else {
            f64::from(value).sqrt() as u16
        };
        vm.set_result_register(root);
        Ok(())
    }

    fn delay(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let Some(args) = Self::arg_values(vm, 1)? else {
            vm.set_result_register(0);
            return Ok(());
        };
        self.delays_ms.push(args[0]);
        vm.set_result_register(1);
        Ok(())
    }
}

impl ImportHost for Console {
    fn call(&mut self, id: u16, vm: &mut Vm) -> Result<(), VmError> {
        match id {
            100 => self.clear(vm),
            101 => self.set_pixel(vm),
            102 => self.line(vm),
            103 => self.rect(vm, false),
            104 => self.rect(vm, true),
            105 => self.circle(vm),
            106 => self.sprite(vm),
            107 => self.print(vm),
            109 => self.flip(vm),
            200 => self.play_tone(vm),
            300 => self.key_query(vm, false),
            301 => self.key_query(vm, true),
            501 => Self::trig(vm, f64::sin),
            502 => Self::trig(vm, f64::cos),
            503 => Self::sqrt(vm),
            900 => self.delay(vm),
            _ => self.imports.call(id, vm),
        }
    }
}
