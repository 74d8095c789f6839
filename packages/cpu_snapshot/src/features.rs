//! Decoding of instruction set extension flags and identification strings from the raw register
//! tuples returned by the x86 feature query instruction (CPUID).
//!
//! Everything here is a pure function of its inputs. Callers supply the raw register tuples,
//! which makes the decoding fully deterministic in tests.

use std::fmt;

use derive_more::Display;

/// The canonical vendor string reported by Intel processors.
pub const INTEL_VENDOR_STRING: &str = "GenuineIntel";

/// The canonical vendor string reported by AMD processors.
pub const AMD_VENDOR_STRING: &str = "AuthenticAMD";

/// Basic leaf that reports the vendor string and the highest supported basic leaf.
pub(crate) const VENDOR_LEAF: u32 = 0;
/// Basic leaf with the classic feature bits.
pub(crate) const BASIC_FEATURES_LEAF: u32 = 1;
/// Basic leaf with the structured extended feature bits.
pub(crate) const STRUCTURED_FEATURES_LEAF: u32 = 7;
/// Extended leaf that reports the highest supported extended leaf.
pub(crate) const EXTENDED_MAX_LEAF: u32 = 0x8000_0000;
/// Extended leaf with the AMD extended feature bits.
pub(crate) const EXTENDED_FEATURES_LEAF: u32 = 0x8000_0001;
/// First of the three extended leaves that carry the brand string.
pub(crate) const BRAND_FIRST_LEAF: u32 = 0x8000_0002;
/// Last of the three extended leaves that carry the brand string.
pub(crate) const BRAND_LAST_LEAF: u32 = 0x8000_0004;

/// The four registers returned by one feature query.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "the instruction returns exactly these four registers"
)]
pub struct RawRegisters {
    /// Register `eax`.
    pub eax: u32,
    /// Register `ebx`.
    pub ebx: u32,
    /// Register `ecx`.
    pub ecx: u32,
    /// Register `edx`.
    pub edx: u32,
}

impl RawRegisters {
    /// Creates a register tuple from the four register values.
    #[must_use]
    pub const fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self { eax, ebx, ecx, edx }
    }

    const fn get(&self, register: Register) -> u32 {
        match register {
            Register::Ebx => self.ebx,
            Register::Ecx => self.ecx,
            Register::Edx => self.edx,
        }
    }
}

/// The processor vendor, as far as feature decoding is concerned.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Vendor {
    /// The vendor string was exactly [`INTEL_VENDOR_STRING`].
    #[display("Intel")]
    Intel,

    /// The vendor string was exactly [`AMD_VENDOR_STRING`].
    #[display("AMD")]
    Amd,

    /// Any other vendor string. Only general feature bits are decoded for such processors.
    #[display("other")]
    Other,
}

impl Vendor {
    /// Identifies the vendor by exact match against the canonical 12-character vendor strings.
    #[must_use]
    pub fn from_vendor_string(vendor: &str) -> Self {
        match vendor {
            INTEL_VENDOR_STRING => Self::Intel,
            AMD_VENDOR_STRING => Self::Amd,
            _ => Self::Other,
        }
    }
}

/// An instruction set extension that the decoder knows about.
///
/// The discriminant is the position of the feature in the [`FeatureFlags`] bit set.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
#[repr(u8)]
pub enum Feature {
    /// Streaming SIMD Extensions.
    #[display("SSE")]
    Sse,
    /// Streaming SIMD Extensions 2.
    #[display("SSE2")]
    Sse2,
    /// Streaming SIMD Extensions 3.
    #[display("SSE3")]
    Sse3,
    /// Supplemental Streaming SIMD Extensions 3.
    #[display("SSSE3")]
    Ssse3,
    /// Streaming SIMD Extensions 4.1.
    #[display("SSE4.1")]
    Sse4_1,
    /// Streaming SIMD Extensions 4.2.
    #[display("SSE4.2")]
    Sse4_2,
    /// Advanced Vector Extensions.
    #[display("AVX")]
    Avx,

    /// Population count instruction. Intel only.
    #[display("POPCNT")]
    Popcnt,
    /// Carry-less multiplication. Intel only.
    #[display("PCLMULQDQ")]
    Pclmulqdq,
    /// AES new instructions. Intel only.
    #[display("AES-NI")]
    Aes,
    /// Three-operand fused multiply-add. Intel only.
    #[display("FMA3")]
    Fma,
    /// Half-precision floating point conversion. Intel only.
    #[display("F16C")]
    F16c,
    /// Extended processor state save/restore. Intel only.
    #[display("XSAVE")]
    Xsave,
    /// Extended processor state management enabled by the operating system. Intel only.
    #[display("OSXSAVE")]
    Osxsave,
    /// Hardware random number generator. Intel only.
    #[display("RDRAND")]
    Rdrand,
    /// Hardware random seed generator. Intel only.
    #[display("RDSEED")]
    Rdseed,
    /// Multi-precision add-carry instructions. Intel only.
    #[display("ADX")]
    Adx,
    /// Memory protection extensions. Intel only.
    #[display("MPX")]
    Mpx,
    /// Prefetch with intent to write. Intel only.
    #[display("PREFETCHWT1")]
    Prefetchwt1,

    /// Advanced Vector Extensions 2.
    #[display("AVX2")]
    Avx2,
    /// Bit manipulation instruction set 1.
    #[display("BMI1")]
    Bmi1,
    /// Bit manipulation instruction set 2.
    #[display("BMI2")]
    Bmi2,
    /// AVX-512 foundation.
    #[display("AVX-512F")]
    Avx512f,
    /// SHA extensions.
    #[display("SHA")]
    Sha,

    /// Legacy SSE4a instructions. AMD only.
    #[display("SSE4A")]
    Sse4a,
    /// Extended operations. AMD only.
    #[display("XOP")]
    Xop,
    /// Four-operand fused multiply-add. AMD only.
    #[display("FMA4")]
    Fma4,
    /// Extended 3DNow! instructions. AMD only.
    #[display("3DNow!+")]
    ThreeDNowPlus,
}

impl Feature {
    /// Every feature the decoder knows about, in bit set order.
    pub const ALL: [Self; 28] = [
        Self::Sse,
        Self::Sse2,
        Self::Sse3,
        Self::Ssse3,
        Self::Sse4_1,
        Self::Sse4_2,
        Self::Avx,
        Self::Popcnt,
        Self::Pclmulqdq,
        Self::Aes,
        Self::Fma,
        Self::F16c,
        Self::Xsave,
        Self::Osxsave,
        Self::Rdrand,
        Self::Rdseed,
        Self::Adx,
        Self::Mpx,
        Self::Prefetchwt1,
        Self::Avx2,
        Self::Bmi1,
        Self::Bmi2,
        Self::Avx512f,
        Self::Sha,
        Self::Sse4a,
        Self::Xop,
        Self::Fma4,
        Self::ThreeDNowPlus,
    ];

    /// The vendor that owns this feature bit, or `None` if it is decoded for every vendor.
    #[must_use]
    pub fn owning_vendor(self) -> Option<Vendor> {
        DECODE_TABLE
            .iter()
            .find(|entry| entry.feature == self)
            .and_then(|entry| entry.owner)
    }

    const fn mask(self) -> u32 {
        1 << (self as u8)
    }
}

/// The set of instruction set extensions reported by the processor.
///
/// Vendor-gated features are only ever present if the vendor string matched the owning vendor
/// exactly. General features are decoded for every vendor.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct FeatureFlags {
    bits: u32,
}

impl FeatureFlags {
    /// A set with no features present.
    #[must_use]
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Whether the feature is present.
    #[must_use]
    pub const fn contains(self, feature: Feature) -> bool {
        self.bits & feature.mask() != 0
    }

    /// Whether no feature at all is present.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Iterates over the present features in [`Feature::ALL`] order.
    pub fn iter(self) -> impl Iterator<Item = Feature> {
        Feature::ALL
            .into_iter()
            .filter(move |feature| self.contains(*feature))
    }

    fn insert(&mut self, feature: Feature) {
        self.bits |= feature.mask();
    }
}

impl fmt::Debug for FeatureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Feature> for FeatureFlags {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        let mut flags = Self::empty();

        for feature in iter {
            flags.insert(feature);
        }

        flags
    }
}

/// The raw register tuples that feature decoding consumes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "mirrors the fixed set of leaves the decode table refers to"
)]
pub struct FeatureLeaves {
    /// Leaf 1, subleaf 0.
    pub basic: RawRegisters,

    /// Leaf 7, subleaf 0.
    pub structured: RawRegisters,

    /// Extended leaf `0x8000_0001`. Only queried for AMD processors.
    pub extended: Option<RawRegisters>,
}

impl FeatureLeaves {
    /// Queries the leaves needed for feature decoding via the provided raw query function.
    ///
    /// Leaves beyond the highest supported leaf are not queried and are reported as all zero,
    /// because processors return unrelated data for unsupported leaves. The extended leaf is only
    /// queried when the vendor string identifies an AMD processor.
    pub fn query(vendor_string: &str, mut query: impl FnMut(u32, u32) -> RawRegisters) -> Self {
        let max_basic_leaf = query(VENDOR_LEAF, 0).eax;

        let basic = if max_basic_leaf >= BASIC_FEATURES_LEAF {
            query(BASIC_FEATURES_LEAF, 0)
        } else {
            RawRegisters::default()
        };

        let structured = if max_basic_leaf >= STRUCTURED_FEATURES_LEAF {
            query(STRUCTURED_FEATURES_LEAF, 0)
        } else {
            RawRegisters::default()
        };

        let extended = (Vendor::from_vendor_string(vendor_string) == Vendor::Amd).then(|| {
            if query(EXTENDED_MAX_LEAF, 0).eax >= EXTENDED_FEATURES_LEAF {
                query(EXTENDED_FEATURES_LEAF, 0)
            } else {
                RawRegisters::default()
            }
        });

        Self {
            basic,
            structured,
            extended,
        }
    }

    const fn leaf(&self, leaf: Leaf) -> Option<RawRegisters> {
        match leaf {
            Leaf::Basic => Some(self.basic),
            Leaf::Structured => Some(self.structured),
            Leaf::Extended => self.extended,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Leaf {
    Basic,
    Structured,
    Extended,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
// No decoded feature lives in eax.
enum Register {
    Ebx,
    Ecx,
    Edx,
}

#[derive(Debug)]
struct DecodeEntry {
    feature: Feature,
    leaf: Leaf,
    register: Register,
    bit: u8,
    // None means the bit is decoded for every vendor.
    owner: Option<Vendor>,
}

const fn entry(
    feature: Feature,
    leaf: Leaf,
    register: Register,
    bit: u8,
    owner: Option<Vendor>,
) -> DecodeEntry {
    DecodeEntry {
        feature,
        leaf,
        register,
        bit,
        owner,
    }
}

const INTEL: Option<Vendor> = Some(Vendor::Intel);
const AMD: Option<Vendor> = Some(Vendor::Amd);
const ANY: Option<Vendor> = None;

// Positions as documented in the Intel SDM and AMD APM, volume 3, CPUID chapters.
const DECODE_TABLE: [DecodeEntry; 28] = [
    entry(Feature::Sse, Leaf::Basic, Register::Edx, 25, ANY),
    entry(Feature::Sse2, Leaf::Basic, Register::Edx, 26, ANY),
    entry(Feature::Sse3, Leaf::Basic, Register::Ecx, 0, ANY),
    entry(Feature::Ssse3, Leaf::Basic, Register::Ecx, 9, ANY),
    entry(Feature::Sse4_1, Leaf::Basic, Register::Ecx, 19, ANY),
    entry(Feature::Sse4_2, Leaf::Basic, Register::Ecx, 20, ANY),
    entry(Feature::Avx, Leaf::Basic, Register::Ecx, 28, ANY),
    entry(Feature::Popcnt, Leaf::Basic, Register::Ecx, 23, INTEL),
    entry(Feature::Pclmulqdq, Leaf::Basic, Register::Ecx, 1, INTEL),
    entry(Feature::Aes, Leaf::Basic, Register::Ecx, 25, INTEL),
    entry(Feature::Fma, Leaf::Basic, Register::Ecx, 12, INTEL),
    entry(Feature::F16c, Leaf::Basic, Register::Ecx, 29, INTEL),
    entry(Feature::Xsave, Leaf::Basic, Register::Ecx, 26, INTEL),
    entry(Feature::Osxsave, Leaf::Basic, Register::Ecx, 27, INTEL),
    entry(Feature::Rdrand, Leaf::Basic, Register::Ecx, 30, INTEL),
    entry(Feature::Rdseed, Leaf::Structured, Register::Ebx, 18, INTEL),
    entry(Feature::Adx, Leaf::Structured, Register::Ebx, 19, INTEL),
    entry(Feature::Mpx, Leaf::Structured, Register::Ebx, 14, INTEL),
    entry(Feature::Prefetchwt1, Leaf::Structured, Register::Ecx, 0, INTEL),
    entry(Feature::Avx2, Leaf::Structured, Register::Ebx, 5, ANY),
    entry(Feature::Bmi1, Leaf::Structured, Register::Ebx, 3, ANY),
    entry(Feature::Bmi2, Leaf::Structured, Register::Ebx, 8, ANY),
    entry(Feature::Avx512f, Leaf::Structured, Register::Ebx, 16, ANY),
    entry(Feature::Sha, Leaf::Structured, Register::Ebx, 29, ANY),
    entry(Feature::Sse4a, Leaf::Extended, Register::Ecx, 6, AMD),
    entry(Feature::Xop, Leaf::Extended, Register::Ecx, 11, AMD),
    entry(Feature::Fma4, Leaf::Extended, Register::Ecx, 16, AMD),
    entry(Feature::ThreeDNowPlus, Leaf::Extended, Register::Edx, 31, AMD),
];

/// Decodes the instruction set extension flags from raw register tuples.
///
/// General feature bits are decoded for every vendor. Vendor-gated bits are only decoded when
/// `vendor_string` exactly matches the owning vendor's canonical string. This never fails:
/// all-zero input (e.g. on a processor family without the feature query instruction) simply
/// yields an empty set.
#[must_use]
pub fn decode_features(vendor_string: &str, leaves: &FeatureLeaves) -> FeatureFlags {
    let vendor = Vendor::from_vendor_string(vendor_string);

    DECODE_TABLE
        .iter()
        .filter(|entry| entry.owner.is_none_or(|owner| owner == vendor))
        .filter(|entry| {
            leaves
                .leaf(entry.leaf)
                .is_some_and(|registers| registers.get(entry.register) & (1 << entry.bit) != 0)
        })
        .map(|entry| entry.feature)
        .collect()
}

/// Decodes the 12-character vendor string from the registers of leaf 0.
///
/// The string is stored in `ebx`, `edx`, `ecx` order, four little-endian bytes per register.
#[must_use]
pub fn decode_vendor_string(leaf0: &RawRegisters) -> String {
    let bytes = [leaf0.ebx, leaf0.edx, leaf0.ecx]
        .into_iter()
        .flat_map(u32::to_le_bytes)
        .collect::<Vec<_>>();

    string_from_register_bytes(&bytes)
}

/// Decodes the brand string from the registers of extended leaves `0x8000_0002..=0x8000_0004`.
///
/// The brand string is up to 48 bytes, NUL-terminated if shorter. Trailing NUL bytes and
/// surrounding whitespace are removed.
#[must_use]
pub fn decode_brand_string(leaves: &[RawRegisters; 3]) -> String {
    let bytes = leaves
        .iter()
        .flat_map(|registers| [registers.eax, registers.ebx, registers.ecx, registers.edx])
        .flat_map(u32::to_le_bytes)
        .collect::<Vec<_>>();

    string_from_register_bytes(&bytes).trim().to_string()
}

/// Queries and decodes the vendor string via the provided raw query function.
pub(crate) fn query_vendor_string(mut query: impl FnMut(u32, u32) -> RawRegisters) -> String {
    decode_vendor_string(&query(VENDOR_LEAF, 0))
}

/// Queries and decodes the brand string via the provided raw query function.
///
/// Returns an empty string if the processor does not support the brand string leaves.
pub(crate) fn query_brand_string(mut query: impl FnMut(u32, u32) -> RawRegisters) -> String {
    if query(EXTENDED_MAX_LEAF, 0).eax < BRAND_LAST_LEAF {
        return String::new();
    }

    let leaves = [
        query(BRAND_FIRST_LEAF, 0),
        query(BRAND_FIRST_LEAF.wrapping_add(1), 0),
        query(BRAND_LAST_LEAF, 0),
    ];

    decode_brand_string(&leaves)
}

fn string_from_register_bytes(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(bytes.len());

    String::from_utf8_lossy(bytes.get(..end).unwrap_or_default()).into_owned()
}

#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "we need not worry in tests"
)]
