//! # Escritor PSD
//! src/render/psd.rs
//!
//! Escribe un documento Photoshop (versión 1, RGB de 8 bits) con la imagen
//! compuesta comprimida en RLE (PackBits). Secciones, en orden:
//!
//! 1. Header: `8BPS`, versión, canales, alto, ancho, profundidad, modo.
//! 2. Color mode data (vacía en RGB).
//! 3. Image resources: solo ResolutionInfo (0x03ED) con los DPI.
//! 4. Layer and mask info (vacía: el documento es solo la compuesta).
//! 5. Image data: compresión 1, tabla de bytes por fila y las filas.

use super::layout::{CanvasLayout, DPI};

const SIGNATURE: &[u8; 4] = b"8BPS";
const RESOURCE_SIGNATURE: &[u8; 4] = b"8BIM";
const RESOLUTION_INFO_ID: u16 = 0x03ED;
const CHANNELS: u16 = 3;
const DEPTH: u16 = 8;
const COLOR_MODE_RGB: u16 = 3;
const COMPRESSION_RLE: u16 = 1;

const BACKGROUND: u8 = 0xFF;
const FOLD_LINE: u8 = 0x00;

/// Codifica una fila con PackBits
pub fn packbits(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len() / 64 + 2);
    let mut i = 0;

    while i < row.len() {
        // Longitud de la corrida de bytes iguales desde i (máx 128)
        let mut run = 1;
        while i + run < row.len() && run < 128 && row[i + run] == row[i] {
            run += 1;
        }

        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(row[i]);
            i += run;
            continue;
        }

        // Literales hasta que empiece una corrida o se llegue a 128.
        // row[i] != row[i + 1], así que al menos se toma un byte.
        let start = i;
        while i < row.len() && i - start < 128 {
            if i + 1 < row.len() && row[i] == row[i + 1] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&row[start..i]);
    }

    out
}

/// Fila de fondo con las columnas de pliegue marcadas
fn plain_row(layout: &CanvasLayout) -> Vec<u8> {
    let mut row = vec![BACKGROUND; layout.width as usize];
    for &x in &layout.vertical_folds {
        row[x as usize] = FOLD_LINE;
    }
    row
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_header(out: &mut Vec<u8>, layout: &CanvasLayout) {
    out.extend_from_slice(SIGNATURE);
    push_u16(out, 1);
    out.extend_from_slice(&[0u8; 6]);
    push_u16(out, CHANNELS);
    push_u32(out, layout.height);
    push_u32(out, layout.width);
    push_u16(out, DEPTH);
    push_u16(out, COLOR_MODE_RGB);
}

fn write_resolution_resource(out: &mut Vec<u8>) {
    let fixed_dpi = DPI << 16;
    let mut block = Vec::with_capacity(28);
    block.extend_from_slice(RESOURCE_SIGNATURE);
    push_u16(&mut block, RESOLUTION_INFO_ID);
    // Nombre pascal vacío, rellenado a longitud par
    block.extend_from_slice(&[0, 0]);
    push_u32(&mut block, 16);
    // hRes, hResUnit (1 = pixels/inch), widthUnit (1 = inches)
    push_u32(&mut block, fixed_dpi);
    push_u16(&mut block, 1);
    push_u16(&mut block, 1);
    // vRes, vResUnit, heightUnit
    push_u32(&mut block, fixed_dpi);
    push_u16(&mut block, 1);
    push_u16(&mut block, 1);

    push_u32(out, block.len() as u32);
    out.extend_from_slice(&block);
}

/// Callback invocado con la fracción (0.0-1.0) de filas escritas
pub type RowProgress<'a> = &'a mut dyn FnMut(f64);

/// Escribe el documento completo
pub fn write_document(layout: &CanvasLayout, on_rows: RowProgress<'_>) -> Vec<u8> {
    let plain = packbits(&plain_row(layout));
    let fold = packbits(&vec![FOLD_LINE; layout.width as usize]);

    let height = layout.height as usize;
    let is_fold_row = |y: usize| layout.horizontal_folds.contains(&(y as u32));
    let data_len: usize = (0..height)
        .map(|y| if is_fold_row(y) { fold.len() } else { plain.len() })
        .sum::<usize>()
        * CHANNELS as usize;

    let mut out = Vec::with_capacity(64 + height * CHANNELS as usize * 2 + data_len);

    write_header(&mut out, layout);
    push_u32(&mut out, 0);
    write_resolution_resource(&mut out);
    push_u32(&mut out, 0);

    push_u16(&mut out, COMPRESSION_RLE);
    for _ in 0..CHANNELS {
        for y in 0..height {
            let len = if is_fold_row(y) { fold.len() } else { plain.len() };
            push_u16(&mut out, len as u16);
        }
    }

    let total_rows = (height * CHANNELS as usize).max(1);
    let step = (height / 4).max(1);
    for channel in 0..CHANNELS as usize {
        for y in 0..height {
            let row = if is_fold_row(y) { &fold } else { &plain };
            out.extend_from_slice(row);
            if y % step == 0 {
                on_rows((channel * height + y) as f64 / total_rows as f64);
            }
        }
    }
    on_rows(1.0);

    out
}
