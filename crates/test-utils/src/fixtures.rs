//! Fixed inputs shared by tests.

/// Directory listing as served by the RISH archive for one day.
pub const DAY_LISTING_HTML: &str = r#"<html><head><title>Index of /arch/jmadata/data/gpv/original/2025/11/27</title></head>
<body><h1>Index of /arch/jmadata/data/gpv/original/2025/11/27</h1>
<pre><a href="?C=N;O=D">Name</a>                    <a href="?C=M;O=A">Last modified</a>      <a href="?C=S;O=A">Size</a>
<a href="/arch/jmadata/data/gpv/original/2025/11/">Parent Directory</a>                             -
<a href="Z__C_RJTD_20251127090000_MSM_GPV_Rjp_Lsurf_FH00-15_grib2.bin">Z__C_RJTD_20251127090000_MSM_GPV_Rjp_Lsurf_FH00-15_grib2.bin</a> 2025-11-27 11:41   31M
<a href="Z__C_RJTD_20251127090000_MSM_GPV_Rjp_Lsurf_FH16-33_grib2.bin">Z__C_RJTD_20251127090000_MSM_GPV_Rjp_Lsurf_FH16-33_grib2.bin</a> 2025-11-27 11:42   35M
<a href="Z__C_RJTD_20251127090000_MSM_GPV_Rjp_Lsurf_FH34-39_grib2.bin">Z__C_RJTD_20251127090000_MSM_GPV_Rjp_Lsurf_FH34-39_grib2.bin</a> 2025-11-27 11:42   12M
<a href="Z__C_RJTD_20251127090000_MSM_GPV_Rjp_L-pall_FH00-15_grib2.bin">Z__C_RJTD_20251127090000_MSM_GPV_Rjp_L-pall_FH00-15_grib2.bin</a> 2025-11-27 11:45  180M
<a href="Z__C_RJTD_20251127150000_MSM_GPV_Rjp_Lsurf_FH00-15_grib2.bin">Z__C_RJTD_20251127150000_MSM_GPV_Rjp_Lsurf_FH00-15_grib2.bin</a> 2025-11-27 17:40   31M
<a href="Z__C_RJTD_20251127150000_MSM_GPV_Rjp_Lsurf_FH16-33_grib2.bin">Z__C_RJTD_20251127150000_MSM_GPV_Rjp_Lsurf_FH16-33_grib2.bin</a> 2025-11-27 17:41   35M
</pre></body></html>
"#;

/// Year-level listing with a stray non-year directory.
pub const YEAR_LISTING_HTML: &str = r#"<pre>
<a href="../">Parent Directory</a>
<a href="2024/">2024/</a>                  2024-12-31 23:59    -
<a href="2025/">2025/</a>                  2025-11-27 00:00    -
<a href="latest/">latest/</a>              2025-11-27 00:00    -
</pre>"#;
