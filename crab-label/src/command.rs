//! Label command accumulator
//!
//! Records one agent drawing/configuration command per call, in call order,
//! under an auto-incrementing sequence number. The agent executes commands
//! in sequence order, so overlay commands (see [`BlockOption`]) depend on it.
//!
//! An accumulator is owned by whoever builds the label. It carries no lock:
//! build one label per accumulator at a time.

use serde::Serialize;
use tracing::instrument;

use crate::batch::{CommandBatch, EncodedPayload, LabelBatchEncoder};
use crate::error::{LabelError, LabelResult};

/// A single typed command argument
///
/// The agent parses arguments by JSON type, so an integer must stay an
/// integer and a boolean must never become `"true"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Arg {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<u32> for Arg {
    fn from(v: u32) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Str(v)
    }
}

/// An agent command: name plus ordered arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Arg>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }
}

/// A command tagged with its position in the label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedCommand {
    pub seq: u32,
    pub command: Command,
}

impl SequencedCommand {
    /// Wire key for this command (`func0`, `func1`, ...)
    pub fn key(&self) -> String {
        format!("func{}", self.seq)
    }
}

// ============================================================================
// Argument types
// ============================================================================

/// Paper/media sensing mode for `setLength`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Gap,
    Continuous,
    BlackMark,
}

impl MediaType {
    fn code(self) -> &'static str {
        match self {
            MediaType::Gap => "G",
            MediaType::Continuous => "C",
            MediaType::BlackMark => "B",
        }
    }
}

/// Print direction for `setOrientation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Top,
    Bottom,
}

impl Orientation {
    fn code(self) -> &'static str {
        match self {
            Orientation::Top => "T",
            Orientation::Bottom => "B",
        }
    }
}

/// QR error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrEcc {
    L,
    #[default]
    M,
    Q,
    H,
}

impl QrEcc {
    fn code(self) -> &'static str {
        match self {
            QrEcc::L => "L",
            QrEcc::M => "M",
            QrEcc::Q => "Q",
            QrEcc::H => "H",
        }
    }
}

/// Render behavior of `drawBlock` against what is already drawn
///
/// Blocks apply in sequence order; reordering changes the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOption {
    /// Draw over existing content
    Overwrite,
    /// Clear existing content, then draw (exclusive OR)
    ExcludeExisting,
    /// Erase existing content inside the block
    DeleteExisting,
    /// Diagonal line from start to end
    Slope,
    /// Hollow box with the given line thickness
    Box,
}

impl BlockOption {
    fn code(self) -> &'static str {
        match self {
            BlockOption::Overwrite => "O",
            BlockOption::ExcludeExisting => "E",
            BlockOption::DeleteExisting => "D",
            BlockOption::Slope => "S",
            BlockOption::Box => "B",
        }
    }
}

/// Resident device font text (`drawDeviceFont`)
#[derive(Debug, Clone)]
pub struct DeviceFont<'a> {
    pub text: &'a str,
    pub x: i64,
    pub y: i64,
    /// Font id as the agent names it (`"0"`..`"9"`, `"a"`.. for Asian fonts)
    pub font: &'a str,
    pub width_mul: i64,
    pub height_mul: i64,
    pub rotation: i64,
    pub invert: bool,
    pub bold: bool,
    pub alignment: i64,
}

impl<'a> DeviceFont<'a> {
    pub fn new(text: &'a str, x: i64, y: i64) -> Self {
        Self {
            text,
            x,
            y,
            font: "0",
            width_mul: 1,
            height_mul: 1,
            rotation: 0,
            invert: false,
            bold: false,
            alignment: 0,
        }
    }
}

/// Scalable vector font text (`drawVectorFont`)
#[derive(Debug, Clone)]
pub struct VectorFont<'a> {
    pub text: &'a str,
    pub x: i64,
    pub y: i64,
    pub font: &'a str,
    pub width: i64,
    pub height: i64,
    pub right_spacing: i64,
    pub bold: bool,
    pub invert: bool,
    pub italic: bool,
    pub rotation: i64,
    pub alignment: i64,
    pub reverse_direction: bool,
}

impl<'a> VectorFont<'a> {
    pub fn new(text: &'a str, x: i64, y: i64) -> Self {
        Self {
            text,
            x,
            y,
            font: "U",
            width: 25,
            height: 25,
            right_spacing: 0,
            bold: false,
            invert: false,
            italic: false,
            rotation: 0,
            alignment: 0,
            reverse_direction: false,
        }
    }
}

/// Linear barcode (`draw1DBarcode`)
#[derive(Debug, Clone)]
pub struct Barcode1D<'a> {
    pub data: &'a str,
    pub x: i64,
    pub y: i64,
    /// Symbology index, 0 (Code39) .. 16
    pub symbol: i64,
    pub narrow_bar: i64,
    pub wide_bar: i64,
    pub height: i64,
    pub rotation: i64,
    /// Human readable interpretation placement, 0 = none
    pub hri: i64,
    pub quiet_zone: i64,
}

impl<'a> Barcode1D<'a> {
    pub fn new(data: &'a str, x: i64, y: i64, symbol: i64) -> Self {
        Self {
            data,
            x,
            y,
            symbol,
            narrow_bar: 2,
            wide_bar: 6,
            height: 100,
            rotation: 0,
            hri: 1,
            quiet_zone: 0,
        }
    }
}

/// QR code (`drawQRCode`)
#[derive(Debug, Clone)]
pub struct QrCode<'a> {
    pub data: &'a str,
    pub x: i64,
    pub y: i64,
    pub model: i64,
    pub ecc: QrEcc,
    pub size: i64,
    pub rotation: i64,
}

impl<'a> QrCode<'a> {
    pub fn new(data: &'a str, x: i64, y: i64) -> Self {
        Self {
            data,
            x,
            y,
            model: 2,
            ecc: QrEcc::M,
            size: 4,
            rotation: 0,
        }
    }
}

/// PDF417 stacked barcode (`drawPDF417`)
#[derive(Debug, Clone)]
pub struct Pdf417<'a> {
    pub data: &'a str,
    pub x: i64,
    pub y: i64,
    pub max_rows: i64,
    pub max_columns: i64,
    pub ecc: i64,
    pub compression: i64,
    pub hri: bool,
    pub origin_point: i64,
    pub module_width: i64,
    pub bar_height: i64,
    pub rotation: i64,
}

impl<'a> Pdf417<'a> {
    pub fn new(data: &'a str, x: i64, y: i64) -> Self {
        Self {
            data,
            x,
            y,
            max_rows: 30,
            max_columns: 5,
            ecc: 3,
            compression: 0,
            hri: false,
            origin_point: 1,
            module_width: 3,
            bar_height: 10,
            rotation: 0,
        }
    }
}

fn check_range(
    command: &'static str,
    argument: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> LabelResult<()> {
    if value < min || value > max {
        return Err(LabelError::OutOfRange {
            command,
            argument,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_non_empty(command: &'static str, argument: &'static str, value: &str) -> LabelResult<()> {
    if value.is_empty() {
        return Err(LabelError::InvalidArgument {
            command,
            argument,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn check_rotation(command: &'static str, rotation: i64) -> LabelResult<()> {
    check_range(command, "rotation", rotation, 0, 3)
}

// ============================================================================
// Accumulator
// ============================================================================

/// Ordered command list for one label
#[derive(Debug, Default)]
pub struct CommandAccumulator {
    commands: Vec<SequencedCommand>,
    next_seq: u32,
}

impl CommandAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commands recorded since the last snapshot
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append a raw command without validation
    ///
    /// Use for commands without a typed helper; the agent validates them.
    pub fn append<I, A>(&mut self, name: impl Into<String>, args: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.record(name, args.into_iter().map(Into::into).collect())
    }

    /// Assign the next sequence number and store the command
    fn record(&mut self, name: impl Into<String>, args: Vec<Arg>) -> &mut Self {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.commands.push(SequencedCommand {
            seq,
            command: Command::new(name, args),
        });
        self
    }

    /// Take the recorded commands as a batch and reset to empty
    pub fn snapshot(&mut self, request_id: u64) -> CommandBatch {
        let commands = std::mem::take(&mut self.commands);
        self.next_seq = 0;
        CommandBatch::new(request_id, commands)
    }

    /// Snapshot and encode in one step
    #[instrument(skip(self), fields(commands = self.commands.len()))]
    pub fn finish(&mut self, request_id: u64) -> LabelResult<EncodedPayload> {
        LabelBatchEncoder::encode(&self.snapshot(request_id))
    }

    // === Label setup ===

    pub fn set_width(&mut self, width: i64) -> LabelResult<&mut Self> {
        check_range("setWidth", "width", width, 1, i64::MAX)?;
        Ok(self.record("setWidth", vec![width.into()]))
    }

    pub fn set_length(
        &mut self,
        label_length: i64,
        gap_length: i64,
        media: MediaType,
        offset: i64,
    ) -> LabelResult<&mut Self> {
        check_range("setLength", "label_length", label_length, 1, i64::MAX)?;
        check_range("setLength", "gap_length", gap_length, 0, i64::MAX)?;
        Ok(self.record(
            "setLength",
            vec![
                label_length.into(),
                gap_length.into(),
                media.code().into(),
                offset.into(),
            ],
        ))
    }

    pub fn set_speed(&mut self, speed: i64) -> LabelResult<&mut Self> {
        check_range("setSpeed", "speed", speed, 0, 12)?;
        Ok(self.record("setSpeed", vec![speed.into()]))
    }

    pub fn set_density(&mut self, density: i64) -> LabelResult<&mut Self> {
        check_range("setDensity", "density", density, 0, 20)?;
        Ok(self.record("setDensity", vec![density.into()]))
    }

    pub fn set_orientation(&mut self, orientation: Orientation) -> &mut Self {
        self.record("setOrientation", vec![orientation.code().into()])
    }

    pub fn set_offset(&mut self, offset: i64) -> LabelResult<&mut Self> {
        check_range("setOffset", "offset", offset, -100, 100)?;
        Ok(self.record("setOffset", vec![offset.into()]))
    }

    pub fn set_character_set(&mut self, ics: i64, codepage: i64) -> &mut Self {
        self.record("setCharacterSet", vec![ics.into(), codepage.into()])
    }

    pub fn set_auto_cutter(&mut self, enable: bool, cut_frequency: i64) -> LabelResult<&mut Self> {
        check_range("setAutoCutter", "cut_frequency", cut_frequency, 1, 255)?;
        Ok(self.record("setAutoCutter", vec![enable.into(), cut_frequency.into()]))
    }

    pub fn clear_buffer(&mut self) -> &mut Self {
        self.record("clearBuffer", Vec::new())
    }

    // === Text ===

    pub fn draw_device_font(&mut self, f: &DeviceFont<'_>) -> LabelResult<&mut Self> {
        const CMD: &str = "drawDeviceFont";
        check_rotation(CMD, f.rotation)?;
        check_range(CMD, "width_mul", f.width_mul, 1, 9)?;
        check_range(CMD, "height_mul", f.height_mul, 1, 9)?;
        check_range(CMD, "alignment", f.alignment, 0, 2)?;
        check_non_empty(CMD, "font", f.font)?;
        Ok(self.record(
            CMD,
            vec![
                f.text.into(),
                f.x.into(),
                f.y.into(),
                f.font.into(),
                f.width_mul.into(),
                f.height_mul.into(),
                f.rotation.into(),
                f.invert.into(),
                f.bold.into(),
                f.alignment.into(),
            ],
        ))
    }

    pub fn draw_vector_font(&mut self, f: &VectorFont<'_>) -> LabelResult<&mut Self> {
        const CMD: &str = "drawVectorFont";
        check_rotation(CMD, f.rotation)?;
        check_range(CMD, "alignment", f.alignment, 0, 2)?;
        check_range(CMD, "width", f.width, 1, i64::MAX)?;
        check_range(CMD, "height", f.height, 1, i64::MAX)?;
        check_non_empty(CMD, "font", f.font)?;
        Ok(self.record(
            CMD,
            vec![
                f.text.into(),
                f.x.into(),
                f.y.into(),
                f.font.into(),
                f.width.into(),
                f.height.into(),
                f.right_spacing.into(),
                f.bold.into(),
                f.invert.into(),
                f.italic.into(),
                f.rotation.into(),
                f.alignment.into(),
                f.reverse_direction.into(),
            ],
        ))
    }

    pub fn direct_draw_text(&mut self, raw: &str) -> LabelResult<&mut Self> {
        check_non_empty("directDrawText", "raw", raw)?;
        Ok(self.record("directDrawText", vec![raw.into()]))
    }

    // === Barcodes ===

    pub fn draw_1d_barcode(&mut self, b: &Barcode1D<'_>) -> LabelResult<&mut Self> {
        const CMD: &str = "draw1DBarcode";
        check_range(CMD, "symbol", b.symbol, 0, 16)?;
        check_rotation(CMD, b.rotation)?;
        check_range(CMD, "hri", b.hri, 0, 8)?;
        check_non_empty(CMD, "data", b.data)?;
        Ok(self.record(
            CMD,
            vec![
                b.data.into(),
                b.x.into(),
                b.y.into(),
                b.symbol.into(),
                b.narrow_bar.into(),
                b.wide_bar.into(),
                b.height.into(),
                b.rotation.into(),
                b.hri.into(),
                b.quiet_zone.into(),
            ],
        ))
    }

    pub fn draw_qr_code(&mut self, q: &QrCode<'_>) -> LabelResult<&mut Self> {
        const CMD: &str = "drawQRCode";
        check_range(CMD, "model", q.model, 1, 2)?;
        check_range(CMD, "size", q.size, 1, 9)?;
        check_rotation(CMD, q.rotation)?;
        check_non_empty(CMD, "data", q.data)?;
        Ok(self.record(
            CMD,
            vec![
                q.data.into(),
                q.x.into(),
                q.y.into(),
                q.model.into(),
                q.ecc.code().into(),
                q.size.into(),
                q.rotation.into(),
            ],
        ))
    }

    pub fn draw_data_matrix(
        &mut self,
        data: &str,
        x: i64,
        y: i64,
        size: i64,
        invert: bool,
        rotation: i64,
    ) -> LabelResult<&mut Self> {
        const CMD: &str = "drawDataMatrix";
        check_range(CMD, "size", size, 1, 4)?;
        check_rotation(CMD, rotation)?;
        check_non_empty(CMD, "data", data)?;
        Ok(self.record(
            CMD,
            vec![
                data.into(),
                x.into(),
                y.into(),
                size.into(),
                invert.into(),
                rotation.into(),
            ],
        ))
    }

    pub fn draw_pdf417(&mut self, p: &Pdf417<'_>) -> LabelResult<&mut Self> {
        const CMD: &str = "drawPDF417";
        check_range(CMD, "ecc", p.ecc, 0, 8)?;
        check_rotation(CMD, p.rotation)?;
        check_non_empty(CMD, "data", p.data)?;
        Ok(self.record(
            CMD,
            vec![
                p.data.into(),
                p.x.into(),
                p.y.into(),
                p.max_rows.into(),
                p.max_columns.into(),
                p.ecc.into(),
                p.compression.into(),
                p.hri.into(),
                p.origin_point.into(),
                p.module_width.into(),
                p.bar_height.into(),
                p.rotation.into(),
            ],
        ))
    }

    pub fn draw_maxi_code(&mut self, data: &str, x: i64, y: i64, mode: i64) -> LabelResult<&mut Self> {
        const CMD: &str = "drawMaxiCode";
        if !matches!(mode, 2..=4) {
            return Err(LabelError::OutOfRange {
                command: CMD,
                argument: "mode",
                value: mode,
                min: 2,
                max: 4,
            });
        }
        check_non_empty(CMD, "data", data)?;
        Ok(self.record(CMD, vec![data.into(), x.into(), y.into(), mode.into()]))
    }

    // === Geometry ===

    pub fn draw_block(
        &mut self,
        start: (i64, i64),
        end: (i64, i64),
        option: BlockOption,
        thickness: i64,
    ) -> LabelResult<&mut Self> {
        if option == BlockOption::Box || option == BlockOption::Slope {
            check_range("drawBlock", "thickness", thickness, 1, i64::MAX)?;
        }
        Ok(self.record(
            "drawBlock",
            vec![
                start.0.into(),
                start.1.into(),
                end.0.into(),
                end.1.into(),
                option.code().into(),
                thickness.into(),
            ],
        ))
    }

    pub fn draw_circle(&mut self, x: i64, y: i64, size: i64, multiplier: i64) -> LabelResult<&mut Self> {
        check_range("drawCircle", "size", size, 1, 6)?;
        check_range("drawCircle", "multiplier", multiplier, 1, 4)?;
        Ok(self.record(
            "drawCircle",
            vec![x.into(), y.into(), size.into(), multiplier.into()],
        ))
    }

    /// Draw a bitmap given as raw image file bytes
    ///
    /// The agent expects the image base64 encoded.
    pub fn draw_bitmap(
        &mut self,
        image: &[u8],
        x: i64,
        y: i64,
        width: i64,
        dithering: bool,
    ) -> LabelResult<&mut Self> {
        use base64::Engine;

        if image.is_empty() {
            return Err(LabelError::InvalidArgument {
                command: "drawBitmap",
                argument: "image",
                reason: "must not be empty".to_string(),
            });
        }
        check_range("drawBitmap", "width", width, 1, i64::MAX)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        Ok(self.record(
            "drawBitmap",
            vec![
                encoded.into(),
                x.into(),
                y.into(),
                width.into(),
                dithering.into(),
            ],
        ))
    }

    // === Output ===

    pub fn print_buffer(&mut self) -> &mut Self {
        self.record("printBuffer", Vec::new())
    }
}
