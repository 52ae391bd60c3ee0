//! Golden test vectors for canonical encoding.
//!
//! Any implementation of the canonical form must reproduce these bytes and
//! digests exactly; signatures and certificate ids depend on them.

use serde_json::Value;

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Input document as written (keys in arbitrary order).
    pub input_json: &'static str,
    /// Expected canonical encoding.
    pub canonical: &'static str,
    /// Expected hex SHA-256 of the canonical bytes.
    pub sha256: &'static str,
}

impl GoldenVector {
    /// Parse the input document.
    pub fn input(&self) -> Value {
        serde_json::from_str(self.input_json).unwrap_or(Value::Null)
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "flat object",
            input_json: r#"{"b":2,"a":1,"c":"three"}"#,
            canonical: r#"{"a":1,"b":2,"c":"three"}"#,
            sha256: "d25862aad5b96f0fd74c16c2c8dc577956571a9a8307e7280b9574e2a2a3b3e2",
        },
        GoldenVector {
            name: "nested objects inside arrays",
            input_json: r#"{"skills":[{"name":"React","level":7},{"name":"SQL","level":5}],"candidateId":"cand-1"}"#,
            canonical: r#"{"candidateId":"cand-1","skills":[{"level":7,"name":"React"},{"level":5,"name":"SQL"}]}"#,
            sha256: "43c4ed47f2b2a8af5cafeee870ebf79b4a0c001a233f86e5112fc07913444df6",
        },
        GoldenVector {
            name: "keys sort by UTF-8 bytes",
            input_json: r#"{"é":1,"z":2,"A":3,"a":4}"#,
            canonical: r#"{"A":3,"a":4,"z":2,"é":1}"#,
            sha256: "5bed303ab65d461fdba6f1f905b2433b6462f29fc129d54498f86ba1aae07df4",
        },
        GoldenVector {
            name: "string escapes",
            input_json: r#"{"quote":"say \"hi\"","tab":"a\tb","nl":"x\ny"}"#,
            canonical: r#"{"nl":"x\ny","quote":"say \"hi\"","tab":"a\tb"}"#,
            sha256: "181f68023bc68e44960ef9cd0464134035e4b890bd5679b983cbdc802ff83c28",
        },
        GoldenVector {
            name: "scalars",
            input_json: r#"{"t":true,"f":false,"n":null,"i":-12,"x":0.75}"#,
            canonical: r#"{"f":false,"i":-12,"n":null,"t":true,"x":0.75}"#,
            sha256: "2b0e4c8c5a093935a35d0027912c753407ce1743e2803405228b6e1b6645fb49",
        },
        GoldenVector {
            name: "empty containers",
            input_json: r#"{"o":{},"l":[]}"#,
            canonical: r#"{"l":[],"o":{}}"#,
            sha256: "111c683c055d4f0a50ce55366e2dfc66644f79266248039a271dd7e25cd5b104",
        },
    ]
}

/// Certificate id for STU001 / UNI001, React via CS301, 78 marks, NSQF 7.
pub const SCENARIO_A_CERTIFICATE_ID: &str =
    "3fd356efac61b66aa80fe12b9f191d5d230316aed49137301214d0b86d4a6967";
