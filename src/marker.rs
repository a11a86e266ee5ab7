use num_enum::TryFromPrimitive;

/// Marker codes used by the codestream syntax (ISO/IEC 15444-1 Annex A,
/// plus the Part-2 and Part-15 extensions this crate understands).
///
/// Every marker is the big-endian u16 `0xFFxx`. All segments except
/// SOC, SOD and EOC are followed by a 2-byte length that includes the
/// length field itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum J2kMarkerCode {
    /// SOC: start of codestream.
    StartOfCodestream = 0xFF4F,
    /// CAP: extended capabilities (Part-15 presence).
    Capability = 0xFF50,
    /// SIZ: image and tile sizes, component list.
    ImageAndTileSize = 0xFF51,
    /// COD: coding style default.
    CodingStyleDefault = 0xFF52,
    /// COC: coding style per component.
    CodingStyleComponent = 0xFF53,
    /// QCD: quantization default.
    QuantizationDefault = 0xFF5C,
    /// QCC: quantization per component.
    QuantizationComponent = 0xFF5D,
    /// RGN: region of interest (coefficient scaling).
    RegionOfInterest = 0xFF5E,
    /// POC: progression order change.
    ProgressionOrderChange = 0xFF5F,
    /// DCO: DC offset (Part-2).
    DcOffset = 0xFF70,
    /// ADS: arbitrary decomposition style (Part-2).
    ArbitraryDecompositionStyle = 0xFF74,
    /// MCT: multi-component transform matrix (Part-2).
    MultiComponentTransform = 0xFF75,
    /// MCC: multi-component collection (Part-2).
    MultiComponentCollection = 0xFF76,
    /// MCO: multi-component ordering (Part-2).
    MultiComponentOrdering = 0xFF77,
    /// ATK: arbitrary transformation kernel (Part-2).
    ArbitraryTransformationKernel = 0xFF79,
    /// SOT: start of tile-part.
    StartOfTile = 0xFF90,
    /// SOD: start of data.
    StartOfData = 0xFF93,
    /// EOC: end of codestream.
    EndOfCodestream = 0xFFD9,
    /// COM: comment.
    Comment = 0xFF64,
}

impl J2kMarkerCode {
    /// Whether the marker is followed by a length-prefixed segment.
    pub fn has_segment(self) -> bool {
        !matches!(
            self,
            Self::StartOfCodestream | Self::StartOfData | Self::EndOfCodestream
        )
    }
}

pub const MARKER_START_BYTE: u8 = 0xFF;

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn test_try_from_known_codes() {
        assert_eq!(
            J2kMarkerCode::try_from(0xFF4Fu16).unwrap(),
            J2kMarkerCode::StartOfCodestream
        );
        assert_eq!(
            J2kMarkerCode::try_from(0xFF93u16).unwrap(),
            J2kMarkerCode::StartOfData
        );
        assert_eq!(
            J2kMarkerCode::try_from(0xFF75u16).unwrap(),
            J2kMarkerCode::MultiComponentTransform
        );
    }

    #[test]
    fn test_try_from_unknown_code_fails() {
        assert!(J2kMarkerCode::try_from(0xFF01u16).is_err());
    }

    #[test]
    fn test_delimiters_have_no_segment() {
        assert!(!J2kMarkerCode::StartOfCodestream.has_segment());
        assert!(!J2kMarkerCode::StartOfData.has_segment());
        assert!(!J2kMarkerCode::EndOfCodestream.has_segment());
        assert!(J2kMarkerCode::ImageAndTileSize.has_segment());
    }
}
