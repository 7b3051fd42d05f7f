// HLSL sources for the color pipeline, compiled at startup with D3DCompile.
//
// The pixel shader handles both SDR and HDR monitors; the constant buffer
// selects the path per draw. Constant buffer layout must stay in sync with
// the 64-float fill in `kernels::fill_pipeline_constants`.

pub const SHADER_ENTRY: &str = "main";
pub const VS_PROFILE: &str = "vs_5_0";
pub const PS_PROFILE: &str = "ps_5_0";
pub const CS_PROFILE: &str = "cs_5_0";

// Fullscreen triangle from SV_VertexID, no vertex buffer bound.
pub const FULLSCREEN_VS: &str = r#"
struct VsOutput {
    float4 pos : SV_POSITION;
    float2 uv : TEXCOORD0;
};

VsOutput main(uint id : SV_VertexID) {
    VsOutput o;
    o.uv = float2((id << 1) & 2, id & 2);
    o.pos = float4(o.uv * float2(2, -2) + float2(-1, 1), 0, 1);
    return o;
}
"#;

// Correction pixel shader. HDR frames run the ICtCp pipeline (scRGB ->
// Rec.2020 -> LMS -> PQ -> ICtCp -> grayscale/tonemap/dither -> PQ RGB ->
// LUT -> scRGB); SDR frames run gamma-2.2 primaries correction, grayscale,
// LUT and an 8-bit dither.
pub const CORRECTION_PS: &str = r#"
cbuffer PipelineParams : register(b0) {
    float hdrMode;
    float sdrWhiteNits;
    float displayMaxNits;
    float lutSize;
    float desktopGamma;
    float tetrahedralLut;
    float lutPassthrough;
    float manualCorrection;
    float grayscalePointCount;
    float grayscaleEnabled;
    float tonemapEnabled;
    float tonemapCurve;
    float4 primariesRow0;
    float4 primariesRow1;
    float4 primariesRow2;
    float tonemapSourcePeak;
    float tonemapTargetPeak;
    float tonemapDynamic;
    float gamma24;             // SDR only: retarget 2.2 decode to a 2.4 display
    float grayscalePeakNits;   // HDR only: nits the grayscale curve was measured at
    float pad0;
    float pad1;
    float pad2;
    float4 grayscalePoints[8]; // 32 curve samples packed as float4s
};

Texture2D<float4> frameTexture : register(t0);
Texture3D<float4> lutTexture : register(t1);
Texture2D<float> noiseTexture : register(t2);
Texture2D<float> peakTexture : register(t3);
SamplerState pointSampler : register(s0);
SamplerState linearSampler : register(s1);
SamplerState wrapSampler : register(s2);

float3 CorrectPrimaries(float3 rgb) {
    if (manualCorrection < 0.5) return rgb;
    float3x3 mat = float3x3(primariesRow0.xyz, primariesRow1.xyz, primariesRow2.xyz);
    return mul(mat, rgb);
}

// SDR gamma retarget for displays calibrated to BT.1886 (2.4) rather than 2.2.
float3 ShiftGamma24(float3 rgb) {
    if (gamma24 < 0.5f) return rgb;
    float Y = dot(rgb, float3(0.2126f, 0.7152f, 0.0722f));
    if (Y < 1e-6f) return rgb;
    float correctedY = pow(max(Y, 0.0f), 1.090909f);  // 2.4/2.2
    return rgb * (correctedY / Y);
}

// SDR grayscale: curve is indexed by sqrt(Y) so the dark end gets most of the
// points. Interpolation happens in the sqrt domain to match that spacing, and
// the result scales all channels equally to keep chromaticity.
float3 CorrectGrayscaleSdr(float3 rgb) {
    if (grayscaleEnabled < 0.5) return rgb;
    float Y = dot(rgb, float3(0.2126f, 0.7152f, 0.0722f));
    float idx = sqrt(saturate(Y)) * (grayscalePointCount - 1.0f);
    int i0 = (int)floor(idx);
    int i1 = min(i0 + 1, (int)grayscalePointCount - 1);
    float v0 = grayscalePoints[i0 / 4][i0 % 4];
    float v1 = grayscalePoints[i1 / 4][i1 % 4];
    float t = idx - floor(idx);
    float s0 = sqrt(max(v0, 0.0f));
    float s1 = sqrt(max(v1, 0.0f));
    float correctedS = lerp(s0, s1, t);
    float correctedY = correctedS * correctedS;
    if (Y < 1e-6f) return rgb;
    return rgb * (correctedY / Y);
}

// SMPTE ST.2084 constants.
static const float PQ_M1 = 0.1593017578125f;   // 2610/16384
static const float PQ_M2 = 78.84375f;          // 2523/4096 * 128
static const float PQ_C1 = 0.8359375f;         // 3424/4096
static const float PQ_C2 = 18.8515625f;        // 2413/4096 * 32
static const float PQ_C3 = 18.6875f;           // 2392/4096 * 32

// Rec.2020 to LMS, Hunt-Pointer-Estevez with 4% crosstalk (Dolby ICtCp paper).
static const float3x3 Rec2020ToLms = {
    0.41210938f, 0.52392578f, 0.06396484f,
    0.16674805f, 0.72045898f, 0.11279297f,
    0.02416992f, 0.07543945f, 0.90039063f
};

static const float3x3 LmsToRec2020 = {
    3.43661000f, -2.50645000f,  0.06984000f,
   -0.79133000f,  1.98360000f, -0.19227000f,
   -0.02595000f, -0.09891000f,  1.12486000f
};

// L'M'S' to ICtCp: I carries intensity, CT tritan, CP protan.
static const float3x3 LmsPrimeToIctcp = {
    0.50000000f,  0.50000000f,  0.00000000f,
    1.61376953f, -3.32348633f,  1.70971680f,
    4.37817383f, -4.24560547f, -0.13256836f
};

static const float3x3 IctcpToLmsPrime = {
    1.0f,  0.00860904f,  0.11102963f,
    1.0f, -0.00860904f, -0.11102963f,
    1.0f,  0.56003134f, -0.32062717f
};

// PQ encode: linear light normalized to 10000 nits -> 0..1 signal.
float3 LinearToPq(float3 L) {
    float3 Y = max(L, 1e-10f);
    float3 Ym = pow(Y, PQ_M1);
    return pow((PQ_C1 + PQ_C2 * Ym) / (1.0f + PQ_C3 * Ym), PQ_M2);
}

float3 PqToLinear(float3 pq) {
    float3 Vm = pow(max(pq, 1e-10f), 1.0f / PQ_M2);
    float3 t = max(Vm - PQ_C1, 0.0f) / max(PQ_C2 - PQ_C3 * Vm, 1e-10f);
    return pow(t, 1.0f / PQ_M1);
}

float LinearToPqScalar(float L) {
    float Y = max(L, 1e-10f);
    float Ym = pow(Y, PQ_M1);
    return pow((PQ_C1 + PQ_C2 * Ym) / (1.0f + PQ_C3 * Ym), PQ_M2);
}

float PqToLinearScalar(float pq) {
    float Vm = pow(max(pq, 1e-10f), 1.0f / PQ_M2);
    float t = max(Vm - PQ_C1, 0.0f) / max(PQ_C2 - PQ_C3 * Vm, 1e-10f);
    return pow(t, 1.0f / PQ_M1);
}

// BT.2390 EETF evaluated directly in the PQ domain (ITU-R BT.2390-11).
// Black anchors ib/ob are zero; inputs below the knee pass through.
float EetfBt2390Pq(float I, float pqSourcePeak, float pqTargetPeak) {
    float iw = pqSourcePeak;
    float ow = pqTargetPeak;

    float E = I / iw;
    float maxLum = ow / iw;
    float KS = 1.5f * maxLum - 0.5f;
    KS = max(KS, 0.0f);

    if (E <= KS) {
        return E * iw;
    }

    // Hermite spline over the shoulder: P0=KS, P1=maxLum, M0=1-KS, M1=0.
    float t = (E - KS) / (1.0f - KS);
    float t2 = t * t;
    float t3 = t2 * t;
    float h00 = 2.0f * t3 - 3.0f * t2 + 1.0f;
    float h10 = t3 - 2.0f * t2 + t;
    float h01 = -2.0f * t3 + 3.0f * t2;
    float mapped = h00 * KS + h10 * (1.0f - KS) + h01 * maxLum;

    return clamp(mapped * iw, 0.0f, ow);
}

// Exponential shoulder in PQ space. SDR targets compress the full range,
// HDR targets keep everything below 80% of target untouched.
float SoftClipPq(float I, float pqTargetPeak, float targetNits) {
    float pqKnee = (targetNits <= 203.0f) ? 0.0f : pqTargetPeak * 0.8f;

    if (I <= pqKnee) return I;

    float overshoot = I - pqKnee;
    float headroom = pqTargetPeak - pqKnee;
    return pqKnee + headroom * (1.0f - exp(-overshoot / headroom));
}

// Hyperbolic shoulder in PQ space, same knee rule as SoftClipPq.
float ReinhardPq(float I, float pqTargetPeak, float targetNits) {
    float pqKnee = (targetNits <= 203.0f) ? 0.0f : pqTargetPeak * 0.8f;

    if (I <= pqKnee) return I;

    float overshoot = I - pqKnee;
    float headroom = pqTargetPeak - pqKnee;
    return pqKnee + headroom * overshoot / (overshoot + headroom);
}

float HardClipPq(float I, float pqTargetPeak) {
    return min(I, pqTargetPeak);
}

// ITU-R BT.2446 method A applied to the overshoot above the knee. Operates
// on normalized linear luminance, so the caller round-trips through PQ.
float TonemapBt2446a(float Y, float targetPeak, float targetNits) {
    float knee = (targetNits <= 203.0f) ? 0.0f : targetPeak * 0.8f;
    if (Y <= knee) return Y;

    float overshoot = Y - knee;
    float maxOvershoot = 1.0f - knee;
    float headroom = targetPeak - knee;
    float normalizedOvershoot = overshoot / maxOvershoot;

    float Yg = pow(normalizedOvershoot, 1.0f / 2.4f);

    float compressionRatio = maxOvershoot / headroom;
    float pHDR = 1.0f + 32.0f * pow(compressionRatio, 1.0f / 2.4f);
    float pSDR = 1.0f + 32.0f;

    float Yp = log(1.0f + (pHDR - 1.0f) * Yg) / log(pHDR);

    float Yc;
    if (Yp <= 0.7399f)
        Yc = Yp * 1.0770f;
    else if (Yp < 0.9909f)
        Yc = Yp * (-1.1510f * Yp + 2.7811f) - 0.6302f;
    else
        Yc = Yp * 0.5000f + 0.5000f;

    float Ysdr = (pow(pSDR, Yc) - 1.0f) / (pSDR - 1.0f);

    float compressed = pow(max(Ysdr, 0.0f), 2.4f);
    return knee + compressed * headroom;
}

// Tonemapping touches only the I channel; CT and CP pass through, which keeps
// hue and saturation stable. Dynamic mode reads the detected peak texture and
// never engages for targets at or below SDR reference white.
float3 TonemapIctcp(float3 ictcp) {
    if (tonemapEnabled < 0.5f) return ictcp;

    float I = ictcp.x;
    if (I <= 0.0f) return ictcp;

    float sourcePeakNits;
    if (tonemapDynamic > 0.5f && tonemapTargetPeak > 203.0f) {
        float detectedPeak = max(peakTexture.Load(int3(0, 0, 0)), 203.0f);
        float minSourcePeak = tonemapTargetPeak * 1.25f;
        sourcePeakNits = max(detectedPeak, minSourcePeak);
    } else {
        sourcePeakNits = (tonemapSourcePeak > 0.0f) ? tonemapSourcePeak : 1000.0f;
    }

    if (sourcePeakNits <= tonemapTargetPeak) return ictcp;

    float pqSourcePeak = LinearToPqScalar(sourcePeakNits / 10000.0f);
    float pqTargetPeak = LinearToPqScalar(tonemapTargetPeak / 10000.0f);

    float mappedI;
    if (tonemapCurve < 0.5f) {
        mappedI = EetfBt2390Pq(I, pqSourcePeak, pqTargetPeak);
    }
    else if (tonemapCurve < 1.5f) {
        mappedI = SoftClipPq(I, pqTargetPeak, tonemapTargetPeak);
    }
    else if (tonemapCurve < 2.5f) {
        mappedI = ReinhardPq(I, pqTargetPeak, tonemapTargetPeak);
    }
    else if (tonemapCurve < 3.5f) {
        // BT.2446A needs linear luminance, so round-trip the I channel.
        float nits = PqToLinearScalar(I) * 10000.0f;
        float normalized = nits / sourcePeakNits;
        float targetNormalized = tonemapTargetPeak / sourcePeakNits;
        float mapped = TonemapBt2446a(normalized, targetNormalized, tonemapTargetPeak);
        mappedI = LinearToPqScalar(mapped * sourcePeakNits / 10000.0f);
    }
    else {
        mappedI = HardClipPq(I, pqTargetPeak);
    }

    return float3(mappedI, ictcp.y, ictcp.z);
}

// HDR grayscale on the I channel. The curve spans 0..grayscalePeakNits in PQ;
// above the measured peak the last point's correction factor carries on.
float3 GrayscaleIctcp(float3 ictcp) {
    if (grayscaleEnabled < 0.5f) return ictcp;

    float I = ictcp.x;
    if (I < 1e-6f) return ictcp;

    float pqPeak = LinearToPqScalar(max(grayscalePeakNits, 1.0f) / 10000.0f);

    float scaledI = I / pqPeak;
    float correctedI;

    if (scaledI <= 1.0f) {
        float idx = scaledI * (grayscalePointCount - 1.0f);
        int i0 = (int)floor(idx);
        int i1 = min(i0 + 1, (int)grayscalePointCount - 1);
        float t = idx - floor(idx);
        float v0 = grayscalePoints[i0 / 4][i0 % 4];
        float v1 = grayscalePoints[i1 / 4][i1 % 4];
        correctedI = lerp(v0, v1, t) * pqPeak;
    } else {
        int lastIdx = (int)grayscalePointCount - 1;
        float lastCurveValue = grayscalePoints[lastIdx / 4][lastIdx % 4];
        correctedI = lastCurveValue * I;
    }

    return float3(correctedI, ictcp.y, ictcp.z);
}

// Blue-noise dither in ICtCp. I gets a full 10-bit LSB of noise, CT/CP half,
// each decorrelated by sampling the tile at a different offset.
float3 DitherIctcp(float3 ictcp, float2 pos) {
    float2 noiseUV = pos / 64.0f;

    float noiseI  = noiseTexture.Sample(wrapSampler, noiseUV);
    float noiseCT = noiseTexture.Sample(wrapSampler, noiseUV + float2(0.5f, 0.0f));
    float noiseCP = noiseTexture.Sample(wrapSampler, noiseUV + float2(0.0f, 0.5f));

    float ditherI  = (noiseI  - 0.5f) / 1023.0f;
    float ditherCT = (noiseCT - 0.5f) / 2046.0f;
    float ditherCP = (noiseCP - 0.5f) / 2046.0f;

    return ictcp + float3(ditherI, ditherCT, ditherCP);
}

float3 SampleLutTetrahedral(float3 rgb) {
    float3 scaled = saturate(rgb) * (lutSize - 1.0f);
    float3 base = floor(scaled);
    float3 frac = scaled - base;
    float3 texelSize = 1.0f / lutSize;
    float3 baseUV = (base + 0.5f) * texelSize;
    float3 c000 = lutTexture.SampleLevel(pointSampler, baseUV, 0).rgb;
    float3 c111 = lutTexture.SampleLevel(pointSampler, baseUV + texelSize, 0).rgb;
    float3 result;
    if (frac.r >= frac.g) {
        if (frac.g >= frac.b) {
            float3 c100 = lutTexture.SampleLevel(pointSampler, baseUV + float3(texelSize.x, 0, 0), 0).rgb;
            float3 c110 = lutTexture.SampleLevel(pointSampler, baseUV + float3(texelSize.x, texelSize.y, 0), 0).rgb;
            result = c000 + (c100 - c000) * frac.r + (c110 - c100) * frac.g + (c111 - c110) * frac.b;
        } else if (frac.r >= frac.b) {
            float3 c100 = lutTexture.SampleLevel(pointSampler, baseUV + float3(texelSize.x, 0, 0), 0).rgb;
            float3 c101 = lutTexture.SampleLevel(pointSampler, baseUV + float3(texelSize.x, 0, texelSize.z), 0).rgb;
            result = c000 + (c100 - c000) * frac.r + (c101 - c100) * frac.b + (c111 - c101) * frac.g;
        } else {
            float3 c001 = lutTexture.SampleLevel(pointSampler, baseUV + float3(0, 0, texelSize.z), 0).rgb;
            float3 c101 = lutTexture.SampleLevel(pointSampler, baseUV + float3(texelSize.x, 0, texelSize.z), 0).rgb;
            result = c000 + (c001 - c000) * frac.b + (c101 - c001) * frac.r + (c111 - c101) * frac.g;
        }
    } else {
        if (frac.b >= frac.g) {
            float3 c001 = lutTexture.SampleLevel(pointSampler, baseUV + float3(0, 0, texelSize.z), 0).rgb;
            float3 c011 = lutTexture.SampleLevel(pointSampler, baseUV + float3(0, texelSize.y, texelSize.z), 0).rgb;
            result = c000 + (c001 - c000) * frac.b + (c011 - c001) * frac.g + (c111 - c011) * frac.r;
        } else if (frac.r >= frac.b) {
            float3 c010 = lutTexture.SampleLevel(pointSampler, baseUV + float3(0, texelSize.y, 0), 0).rgb;
            float3 c110 = lutTexture.SampleLevel(pointSampler, baseUV + float3(texelSize.x, texelSize.y, 0), 0).rgb;
            result = c000 + (c010 - c000) * frac.g + (c110 - c010) * frac.r + (c111 - c110) * frac.b;
        } else {
            float3 c010 = lutTexture.SampleLevel(pointSampler, baseUV + float3(0, texelSize.y, 0), 0).rgb;
            float3 c011 = lutTexture.SampleLevel(pointSampler, baseUV + float3(0, texelSize.y, texelSize.z), 0).rgb;
            result = c000 + (c010 - c000) * frac.g + (c011 - c010) * frac.b + (c111 - c011) * frac.r;
        }
    }
    return result;
}

float3 SampleLutTrilinear(float3 rgb) {
    float3 lutUV = (saturate(rgb) * (lutSize - 1.0f) + 0.5f) / lutSize;
    return lutTexture.Sample(linearSampler, lutUV).rgb;
}

float3 SampleLut(float3 rgb) {
    if (tetrahedralLut > 0.5f) return SampleLutTetrahedral(rgb);
    else return SampleLutTrilinear(rgb);
}

float4 main(float4 pos : SV_POSITION, float2 uv : TEXCOORD0) : SV_TARGET {
    float4 color = frameTexture.Sample(pointSampler, uv);
    if (hdrMode > 0.5) {
        float3 input = color.rgb;

        // Desktop gamma reshape: Windows composes SDR content with the sRGB
        // EOTF, displays use a 2.2 power law. Applies to the 0..1 magnitude
        // only; values above 1.0 (real HDR light) and sign (wide gamut) are
        // carried through untouched.
        if (desktopGamma > 0.5) {
            float3 absInput = abs(input);
            float3 signInput = sign(input);
            float3 sdrPart = min(absInput, 1.0);
            float3 hdrPart = max(absInput - 1.0, 0.0);
            float3 srgbEncoded = lerp(12.92 * sdrPart,
                1.055 * pow(max(sdrPart, 0.0001), 1.0 / 2.4) - 0.055,
                step(0.0031308, sdrPart));
            float3 corrected = pow(max(srgbEncoded, 0.0001), 2.2);
            input = (corrected + hdrPart) * signInput;
        }

        // scRGB BT.709 -> linear Rec.2020.
        float3 rec2020 = float3(
            dot(input, float3(0.6274039f, 0.3292830f, 0.0433131f)),
            dot(input, float3(0.0690973f, 0.9195404f, 0.0113623f)),
            dot(input, float3(0.0163914f, 0.0880133f, 0.8955953f)));

        rec2020 = CorrectPrimaries(rec2020);

        // Into ICtCp. Out-of-gamut colors can go negative in LMS; PQ encode
        // clips those to near zero, which is the only sane mapping for them.
        float3 lms = mul(Rec2020ToLms, rec2020);
        float3 lmsPq = LinearToPq(lms * (80.0f / 10000.0f));
        float3 ictcp = mul(LmsPrimeToIctcp, lmsPq);

        // Display calibration first, then content-dependent compression.
        ictcp = GrayscaleIctcp(ictcp);
        ictcp = TonemapIctcp(ictcp);
        ictcp = DitherIctcp(ictcp, pos.xy);

        // Back to PQ Rec.2020 RGB, which is the space HDR LUTs are built in.
        float3 lmsPq2 = mul(IctcpToLmsPrime, ictcp);
        float3 lms2 = PqToLinear(lmsPq2);
        float3 rec2020Linear = mul(LmsToRec2020, lms2);
        float3 pqRgb = LinearToPq(rec2020Linear);

        float3 lutResult;
        if (lutPassthrough > 0.5) {
            lutResult = pqRgb;
        } else {
            lutResult = SampleLut(pqRgb);
        }

        // PQ -> linear Rec.2020 -> scRGB BT.709 for the FP16 swapchain.
        float3 linearRec2020 = PqToLinear(lutResult) * (10000.0f / 80.0f);
        float3 result = float3(
            dot(linearRec2020, float3(1.6604910f, -0.5876411f, -0.0728499f)),
            dot(linearRec2020, float3(-0.1245505f, 1.1328999f, -0.0083494f)),
            dot(linearRec2020, float3(-0.0181508f, -0.1005789f, 1.1187297f)));

        return float4(result, 1.0);
    }
    else {
        float3 input = color.rgb;
        // Primaries correction runs in linear light. Decode and re-encode
        // both use 2.2 so the pass changes chromaticity, not tone.
        if (manualCorrection > 0.5) {
            float3 lin = pow(max(input, 0.0), 2.2);
            float3x3 mat = float3x3(primariesRow0.xyz, primariesRow1.xyz, primariesRow2.xyz);
            lin = mul(mat, lin);
            lin = max(lin, 0.0);
            input = pow(lin, 1.0 / 2.2);
            input = saturate(input);
        }
        input = CorrectGrayscaleSdr(input);
        input = ShiftGamma24(input);
        float3 corrected;
        if (lutPassthrough > 0.5) corrected = input;
        else corrected = SampleLut(input);
        // One 10-bit LSB of blue noise against banding on the 10-bit target.
        float2 noiseUV = pos.xy / 64.0;
        float noise = noiseTexture.Sample(wrapSampler, noiseUV);
        float dither = (noise - 0.5) / 1024.0;
        float3 dithered = corrected.rgb + dither;
        return float4(dithered, 1.0);
    }
}
"#;

// Peak detection: one 256-thread group sparse-samples the frame, reduces to
// the frame maximum and folds it into the previous smoothed value held in a
// 1x1 R32_FLOAT UAV. Smoothing matches lumaveil_core::peak::smooth_peak.
pub const PEAK_CS: &str = r#"
Texture2D<float4> frameTexture : register(t0);
RWTexture2D<float> peakOutput : register(u0);

cbuffer PeakParams : register(b0) {
    uint frameWidth;
    uint frameHeight;
    float riseRate;
    float fallRate;
    float maxRiseNits;   // slew limit, nits per frame
    float maxFallNits;
    float2 pad;
};

groupshared float sharedMax[256];

// Dispatched as a single (1, 1, 1) group.
[numthreads(256, 1, 1)]
void main(uint3 GTid : SV_GroupThreadID) {
    // 256 threads x 16 samples walk a 64x64 grid over the frame.
    float localMax = 0.0f;

    uint samplesPerThread = 16;

    for (uint i = 0; i < samplesPerThread; i++) {
        uint sampleIdx = GTid.x * samplesPerThread + i;

        uint gridSize = 64;
        uint gx = sampleIdx % gridSize;
        uint gy = sampleIdx / gridSize;

        uint px = (gx * frameWidth) / gridSize;
        uint py = (gy * frameHeight) / gridSize;

        if (px < frameWidth && py < frameHeight) {
            float4 pixel = frameTexture.Load(int3(px, py, 0));
            float Y = dot(pixel.rgb, float3(0.2126f, 0.7152f, 0.0722f));
            float nits = Y * 80.0f;
            localMax = max(localMax, nits);
        }
    }

    sharedMax[GTid.x] = localMax;
    GroupMemoryBarrierWithGroupSync();

    for (uint stride = 128; stride > 0; stride >>= 1) {
        if (GTid.x < stride) {
            sharedMax[GTid.x] = max(sharedMax[GTid.x], sharedMax[GTid.x + stride]);
        }
        GroupMemoryBarrierWithGroupSync();
    }

    // Thread 0 folds the frame peak into the running value: exponential
    // smoothing for small moves, slew limit for scene cuts.
    if (GTid.x == 0) {
        float framePeak = sharedMax[0];
        float prevPeak = peakOutput[uint2(0, 0)];

        if (prevPeak <= 0.0f) prevPeak = framePeak;

        float target;
        float maxDelta;
        if (framePeak > prevPeak) {
            target = lerp(prevPeak, framePeak, riseRate);
            maxDelta = maxRiseNits;
        } else {
            target = lerp(prevPeak, framePeak, fallRate);
            maxDelta = maxFallNits;
        }

        float smoothedPeak = clamp(target, prevPeak - maxDelta, prevPeak + maxDelta);

        smoothedPeak = clamp(smoothedPeak, 0.0f, 10000.0f);
        peakOutput[uint2(0, 0)] = smoothedPeak;
    }
}
"#;

// Frame statistics: luminance range, gamut population counts, SDR clipping,
// HDR brightness histogram. Output decoding lives in
// lumaveil_core::analysis::FrameAnalysis::from_raw, which documents the
// 16-slot layout; keep the two in sync.
pub const ANALYSIS_CS: &str = r#"
Texture2D<float4> frameTexture : register(t0);
RWStructuredBuffer<uint> stats : register(u0);

cbuffer AnalysisParams : register(b0) {
    uint frameWidth;
    uint frameHeight;
    uint hdrMode;
    uint pad;
};

groupshared float sharedPeak[256];
groupshared float sharedMin[256];
groupshared float sharedMinNonZero[256];
groupshared float sharedSum[256];
groupshared uint sharedRec709[256];
groupshared uint sharedP3Only[256];
groupshared uint sharedRec2020Only[256];
groupshared uint sharedOutOfGamut[256];
groupshared uint sharedClipBlack[256];
groupshared uint sharedClipWhite[256];
groupshared uint sharedHist0[256];
groupshared uint sharedHist1[256];
groupshared uint sharedHist2[256];
groupshared uint sharedHist3[256];
groupshared uint sharedHist4[256];

// Coarse matrices, only used for gamut membership tests.
static const float3x3 Bt709ToP3 = {
    0.8225, 0.1774, 0.0000,
    0.0332, 0.9669, 0.0000,
    0.0171, 0.0724, 0.9108
};

static const float3x3 Bt709To2020 = {
    0.6274, 0.3293, 0.0433,
    0.0691, 0.9195, 0.0114,
    0.0164, 0.0880, 0.8956
};

bool IsInGamut(float3 rgb) {
    // Negative components mean the gamut cannot express the color. Values
    // above 1.0 are brightness, not gamut, so only the sign matters. The
    // tolerance absorbs float noise from the matrix multiplies.
    return all(rgb >= -0.005f);
}

[numthreads(256, 1, 1)]
void main(uint3 GTid : SV_GroupThreadID) {
    float localPeak = 0.0f;
    float localMin = 100000.0f;
    float localMinNonZero = 100000.0f;
    float localSum = 0.0f;
    uint localRec709 = 0, localP3Only = 0, localRec2020Only = 0, localOutOfGamut = 0;
    uint localClipBlack = 0, localClipWhite = 0;
    uint localHist0 = 0, localHist1 = 0, localHist2 = 0, localHist3 = 0, localHist4 = 0;

    // ~4096 samples on a grid shaped to the frame's aspect ratio.
    float aspectRatio = (float)frameWidth / (float)frameHeight;
    uint gridX = (uint)sqrt(4096.0f * aspectRatio);
    uint gridY = (uint)sqrt(4096.0f / aspectRatio);
    if (gridX < 1) gridX = 1;
    if (gridY < 1) gridY = 1;
    uint totalSamples = gridX * gridY;

    uint samplesPerThread = (totalSamples + 255) / 256;
    for (uint i = 0; i < samplesPerThread; i++) {
        uint sampleIdx = GTid.x * samplesPerThread + i;
        if (sampleIdx >= totalSamples) break;

        uint gx = sampleIdx % gridX;
        uint gy = sampleIdx / gridX;
        uint px = (gx * frameWidth) / gridX;
        uint py = (gy * frameHeight) / gridY;

        if (px < frameWidth && py < frameHeight) {
            float4 pixel = frameTexture.Load(int3(px, py, 0));
            float3 rgb = pixel.rgb;

            float Y = dot(rgb, float3(0.2126f, 0.7152f, 0.0722f));
            float nitsY = Y * 80.0f;  // scRGB: 1.0 = 80 nits

            localPeak = max(localPeak, nitsY);
            localMin = min(localMin, nitsY);
            if (nitsY > 0.1f) {
                localMinNonZero = min(localMinNonZero, nitsY);
            }
            localSum += nitsY;

            // Gamut classification. SDR capture is 8-bit sRGB, so everything
            // is Rec.709 there. HDR scRGB can carry wider gamuts as negative
            // components; pixels under ~0.1 nit carry no usable color.
            if (!hdrMode) {
                localRec709++;
            } else {
                float luminanceFloor = 0.00125f;

                if (Y < luminanceFloor) {
                    localRec709++;
                } else if (IsInGamut(rgb)) {
                    localRec709++;
                } else {
                    float3 p3 = mul(Bt709ToP3, rgb);
                    if (IsInGamut(p3)) {
                        localP3Only++;
                    } else {
                        float3 r2020 = mul(Bt709To2020, rgb);
                        if (IsInGamut(r2020)) {
                            localRec2020Only++;
                        } else {
                            localOutOfGamut++;
                        }
                    }
                }
            }

            if (!hdrMode) {
                if (all(rgb < 1.0f/255.0f)) localClipBlack++;
                if (all(rgb > 254.0f/255.0f)) localClipWhite++;
            }

            if (hdrMode) {
                if (nitsY < 203.0f) localHist0++;
                else if (nitsY < 1000.0f) localHist1++;
                else if (nitsY < 2000.0f) localHist2++;
                else if (nitsY < 4000.0f) localHist3++;
                else localHist4++;
            }
        }
    }

    sharedPeak[GTid.x] = localPeak;
    sharedMin[GTid.x] = localMin;
    sharedMinNonZero[GTid.x] = localMinNonZero;
    sharedSum[GTid.x] = localSum;
    sharedRec709[GTid.x] = localRec709;
    sharedP3Only[GTid.x] = localP3Only;
    sharedRec2020Only[GTid.x] = localRec2020Only;
    sharedOutOfGamut[GTid.x] = localOutOfGamut;
    sharedClipBlack[GTid.x] = localClipBlack;
    sharedClipWhite[GTid.x] = localClipWhite;
    sharedHist0[GTid.x] = localHist0;
    sharedHist1[GTid.x] = localHist1;
    sharedHist2[GTid.x] = localHist2;
    sharedHist3[GTid.x] = localHist3;
    sharedHist4[GTid.x] = localHist4;
    GroupMemoryBarrierWithGroupSync();

    for (uint stride = 128; stride > 0; stride >>= 1) {
        if (GTid.x < stride) {
            sharedPeak[GTid.x] = max(sharedPeak[GTid.x], sharedPeak[GTid.x + stride]);
            sharedMin[GTid.x] = min(sharedMin[GTid.x], sharedMin[GTid.x + stride]);
            sharedMinNonZero[GTid.x] = min(sharedMinNonZero[GTid.x], sharedMinNonZero[GTid.x + stride]);
            sharedSum[GTid.x] += sharedSum[GTid.x + stride];
            sharedRec709[GTid.x] += sharedRec709[GTid.x + stride];
            sharedP3Only[GTid.x] += sharedP3Only[GTid.x + stride];
            sharedRec2020Only[GTid.x] += sharedRec2020Only[GTid.x + stride];
            sharedOutOfGamut[GTid.x] += sharedOutOfGamut[GTid.x + stride];
            sharedClipBlack[GTid.x] += sharedClipBlack[GTid.x + stride];
            sharedClipWhite[GTid.x] += sharedClipWhite[GTid.x + stride];
            sharedHist0[GTid.x] += sharedHist0[GTid.x + stride];
            sharedHist1[GTid.x] += sharedHist1[GTid.x + stride];
            sharedHist2[GTid.x] += sharedHist2[GTid.x + stride];
            sharedHist3[GTid.x] += sharedHist3[GTid.x + stride];
            sharedHist4[GTid.x] += sharedHist4[GTid.x + stride];
        }
        GroupMemoryBarrierWithGroupSync();
    }

    if (GTid.x == 0) {
        // Sample count comes from the same grid math as the sampling loop.
        float ar = (float)frameWidth / (float)frameHeight;
        uint gX = (uint)sqrt(4096.0f * ar);
        uint gY = (uint)sqrt(4096.0f / ar);
        if (gX < 1) gX = 1;
        if (gY < 1) gY = 1;

        stats[0] = asuint(sharedPeak[0]);
        stats[1] = asuint(sharedMin[0]);
        stats[2] = asuint(sharedSum[0]);
        stats[3] = gX * gY;
        stats[4] = sharedRec709[0];
        stats[5] = sharedP3Only[0];
        stats[6] = sharedRec2020Only[0];
        stats[7] = sharedOutOfGamut[0];
        stats[8] = sharedClipBlack[0];
        stats[9] = sharedClipWhite[0];
        stats[10] = sharedHist0[0];
        stats[11] = sharedHist1[0];
        stats[12] = sharedHist2[0];
        stats[13] = sharedHist3[0];
        stats[14] = sharedHist4[0];
        stats[15] = asuint(sharedMinNonZero[0]);
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn ordered(haystack: &str, needles: &[&str]) {
        let mut last = 0;
        for needle in needles {
            let at = haystack[last..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing or out of order: {needle}"));
            last += at + needle.len();
        }
    }

    #[test]
    fn pipeline_constants_match_cpu_fill_order() {
        // fill_pipeline_constants writes slots by index; the cbuffer must
        // declare the fields in the same order.
        ordered(
            CORRECTION_PS,
            &[
                "float hdrMode;",
                "float sdrWhiteNits;",
                "float displayMaxNits;",
                "float lutSize;",
                "float desktopGamma;",
                "float tetrahedralLut;",
                "float lutPassthrough;",
                "float manualCorrection;",
                "float grayscalePointCount;",
                "float grayscaleEnabled;",
                "float tonemapEnabled;",
                "float tonemapCurve;",
                "float4 primariesRow0;",
                "float4 primariesRow1;",
                "float4 primariesRow2;",
                "float tonemapSourcePeak;",
                "float tonemapTargetPeak;",
                "float tonemapDynamic;",
                "float gamma24;",
                "float grayscalePeakNits;",
                "float4 grayscalePoints[8];",
            ],
        );
    }

    #[test]
    fn register_bindings_are_stable() {
        for binding in [
            "frameTexture : register(t0)",
            "lutTexture : register(t1)",
            "noiseTexture : register(t2)",
            "peakTexture : register(t3)",
            "pointSampler : register(s0)",
            "linearSampler : register(s1)",
            "wrapSampler : register(s2)",
            "register(b0)",
        ] {
            assert!(CORRECTION_PS.contains(binding), "pixel shader lost {binding}");
        }
        assert!(PEAK_CS.contains("peakOutput : register(u0)"));
        assert!(ANALYSIS_CS.contains("stats : register(u0)"));
    }

    #[test]
    fn noise_tile_size_matches_texture() {
        let divisor = format!("/ {}.0", lumaveil_core::noise::NOISE_SIZE);
        assert!(CORRECTION_PS.contains(&divisor));
    }

    #[test]
    fn entry_points_present() {
        assert!(FULLSCREEN_VS.contains("VsOutput main(uint id : SV_VertexID)"));
        assert!(CORRECTION_PS.contains("float4 main(float4 pos : SV_POSITION"));
        assert!(PEAK_CS.contains("void main(uint3 GTid : SV_GroupThreadID)"));
        assert!(ANALYSIS_CS.contains("void main(uint3 GTid : SV_GroupThreadID)"));
        assert_eq!(SHADER_ENTRY, "main");
    }

    #[test]
    fn pq_constants_are_st2084() {
        for hlsl in [CORRECTION_PS] {
            assert!(hlsl.contains("0.1593017578125"));
            assert!(hlsl.contains("78.84375"));
            assert!(hlsl.contains("0.8359375"));
            assert!(hlsl.contains("18.8515625"));
            assert!(hlsl.contains("18.6875"));
        }
    }
}
