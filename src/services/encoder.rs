use crate::models::Color;
use crate::services::canvas::Canvas;
use qrcode::QrCode;
use thiserror::Error;

/// QR error-correction levels, lowest to highest redundancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EcLevel {
    /// ~7% recovery
    Low,
    /// ~15% recovery
    Medium,
    /// ~25% recovery
    Quartile,
    /// ~30% recovery; tolerates a centered logo
    High,
}

impl From<EcLevel> for qrcode::EcLevel {
    fn from(level: EcLevel) -> Self {
        match level {
            EcLevel::Low => qrcode::EcLevel::L,
            EcLevel::Medium => qrcode::EcLevel::M,
            EcLevel::Quartile => qrcode::EcLevel::Q,
            EcLevel::High => qrcode::EcLevel::H,
        }
    }
}

/// Input to a [`QrEncoder`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest<'a> {
    pub text: &'a str,
    pub size: u32,
    pub foreground: Color,
    pub background: Color,
    pub level: EcLevel,
}

/// Errors from the encoding capability
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("A {modules}x{modules} module matrix does not fit a {size}px surface")]
    SurfaceTooSmall { modules: u32, size: u32 },
}

/// Draws a QR matrix for a request onto a drawing surface.
///
/// The implementation owns the symbology; callers only choose text, size,
/// colors and the error-correction level.
pub trait QrEncoder: Send + Sync {
    /// Fill `canvas` with the background and draw the matrix in the foreground color.
    fn draw(&self, request: &EncodeRequest<'_>, canvas: &mut Canvas) -> Result<(), EncodingError>;
}

/// [`QrEncoder`] backed by the `qrcode` crate.
///
/// Modules are drawn at a whole number of pixels each and the matrix is
/// centered; leftover pixels form the margin.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrcodeEncoder;

impl QrcodeEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl QrEncoder for QrcodeEncoder {
    fn draw(&self, request: &EncodeRequest<'_>, canvas: &mut Canvas) -> Result<(), EncodingError> {
        let code = QrCode::with_error_correction_level(request.text.as_bytes(), request.level.into())?;
        let modules = code.width() as u32;
        let size = request.size.min(canvas.width()).min(canvas.height());

        if modules > size {
            return Err(EncodingError::SurfaceTooSmall { modules, size });
        }

        let module_px = (size / modules).max(1);
        let offset = ((size - module_px * modules) / 2) as i64;

        canvas.fill_rect(0, 0, canvas.width(), canvas.height(), request.background);

        for (index, color) in code.to_colors().iter().enumerate() {
            if *color != qrcode::Color::Dark {
                continue;
            }
            let col = (index as u32 % modules) as i64;
            let row = (index as u32 / modules) as i64;
            canvas.fill_rect(
                offset + col * module_px as i64,
                offset + row * module_px as i64,
                module_px,
                module_px,
                request.foreground,
            );
        }

        tracing::trace!(
            "Encoded {} bytes as {}x{} modules at {}px each",
            request.text.len(),
            modules,
            modules,
            module_px
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str, size: u32) -> EncodeRequest<'_> {
        EncodeRequest {
            text,
            size,
            foreground: Color::BLACK,
            background: Color::WHITE,
            level: EcLevel::High,
        }
    }

    #[test]
    fn test_draws_finder_pattern_in_corner() {
        let mut canvas = Canvas::new(300, 300, Color::WHITE);
        QrcodeEncoder::new()
            .draw(&request("https://example.com", 300), &mut canvas)
            .unwrap();

        let code =
            QrCode::with_error_correction_level(b"https://example.com", qrcode::EcLevel::H).unwrap();
        let modules = code.width() as u32;
        let module_px = 300 / modules;
        let offset = (300 - module_px * modules) / 2;

        // Top-left finder pattern: outer ring dark, separator light
        assert_eq!(canvas.pixel(offset, offset), Some(Color::BLACK.to_rgba()));
        assert_eq!(
            canvas.pixel(offset + 7 * module_px, offset),
            Some(Color::WHITE.to_rgba())
        );
        // Margin stays background
        if offset > 0 {
            assert_eq!(canvas.pixel(0, 0), Some(Color::WHITE.to_rgba()));
        }
    }

    #[test]
    fn test_uses_requested_colors() {
        let fg = Color::rgb(10, 20, 30);
        let bg = Color::rgb(200, 210, 220);
        let mut canvas = Canvas::new(200, 200, Color::WHITE);

        let req = EncodeRequest {
            foreground: fg,
            background: bg,
            ..request("colors", 200)
        };
        QrcodeEncoder::new().draw(&req, &mut canvas).unwrap();

        let pixels: Vec<_> = canvas.image().pixels().copied().collect();
        assert!(pixels.iter().all(|p| *p == fg.to_rgba() || *p == bg.to_rgba()));
        assert!(pixels.contains(&fg.to_rgba()));
        assert!(pixels.contains(&bg.to_rgba()));
    }

    #[test]
    fn test_too_dense_for_surface() {
        let text = "x".repeat(1000);
        let mut canvas = Canvas::new(100, 100, Color::WHITE);

        let err = QrcodeEncoder::new()
            .draw(&request(&text, 100), &mut canvas)
            .unwrap_err();
        assert!(matches!(err, EncodingError::SurfaceTooSmall { .. }));
    }

    #[test]
    fn test_data_too_long() {
        let text = "x".repeat(4000);
        let mut canvas = Canvas::new(1024, 1024, Color::WHITE);

        let err = QrcodeEncoder::new()
            .draw(&request(&text, 1024), &mut canvas)
            .unwrap_err();
        assert!(matches!(err, EncodingError::Encode(_)));
    }

    #[test]
    fn test_ec_level_mapping() {
        assert_eq!(qrcode::EcLevel::from(EcLevel::High), qrcode::EcLevel::H);
        assert_eq!(qrcode::EcLevel::from(EcLevel::Low), qrcode::EcLevel::L);
        assert!(EcLevel::High > EcLevel::Quartile);
    }
}
