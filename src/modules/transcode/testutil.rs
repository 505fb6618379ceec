//! Shell stand-ins for ffmpeg/ffprobe used by the pipeline tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Handles the non-encode invocations: hardware trials fail, brightness
/// samples return mid-grey, frame grabs write a tiny file.
const PRELUDE: &str = r#"for last; do :; done
case "$*" in
  *"-f null"*) echo 'hardware encoder unavailable' >&2; exit 1 ;;
  *rawvideo*) printf '\200'; exit 0 ;;
esac
case "$last" in
  *.jpg) printf 'jpeg' > "$last"; exit 0 ;;
esac
"#;

/// An encoder that reports progress at 20%, 60% and 100% of a 10 s clip.
pub fn succeeding_ffmpeg(dir: &Path, encode_delay: &str) -> PathBuf {
    let body = format!(
        r#"{PRELUDE}printf 'frame=   10 fps=25 q=28.0 size=       1kB time=00:00:02.00 bitrate=   1.0kbits/s speed=2.0x\r' >&2
sleep {encode_delay}
printf 'frame=   50 fps=25 q=28.0 size=       2kB time=00:00:06.00 bitrate=   1.0kbits/s speed=2.0x\r' >&2
printf 'frame=  100 fps=25 q=28.0 size=       3kB time=00:00:10.00 bitrate=   1.0kbits/s speed=2.0x\n' >&2
printf 'transcoded-bytes' > "$last"
exit 0
"#
    );
    write_script(dir, "ffmpeg", &body)
}

/// An encoder that reaches 30% of a 10 s clip, leaves a partial file and dies.
pub fn failing_ffmpeg(dir: &Path) -> PathBuf {
    let body = format!(
        r#"{PRELUDE}printf 'frame=   30 fps=25 q=28.0 size=       1kB time=00:00:03.00 bitrate=   1.0kbits/s speed=1.5x\r' >&2
printf 'partial' > "$last"
echo 'Error while encoding stream #0:0: Invalid data found when processing input' >&2
exit 1
"#
    );
    write_script(dir, "ffmpeg", &body)
}

pub fn ffprobe_reporting(dir: &Path, codec: &str, profile: &str, level: i64) -> PathBuf {
    let body = format!(
        r#"cat <<'EOF'
{{"streams":[{{"codec_name":"{codec}","profile":"{profile}","level":{level},"pix_fmt":"yuv420p"}}],"format":{{"duration":"10.000000"}}}}
EOF
"#
    );
    write_script(dir, "ffprobe", &body)
}

/// An encoder whose banner carries a 70 KiB line with no delimiter, followed
/// by enough stats output to fill the stderr pipe if nobody reads it.
pub fn oversized_banner_ffmpeg(dir: &Path) -> PathBuf {
    let body = format!(
        r#"{PRELUDE}head -c 71680 /dev/zero | tr '\000' 'x' >&2
i=0
while [ $i -lt 4000 ]; do
  printf 'frame=   10 fps=25 q=28.0 size=       1kB time=00:00:02.00 bitrate=   1.0kbits/s speed=2.0x\r' >&2
  i=$((i + 1))
done
printf 'frame=  100 fps=25 q=28.0 size=       3kB time=00:00:10.00 bitrate=   1.0kbits/s speed=2.0x\n' >&2
printf 'transcoded-bytes' > "$last"
exit 0
"#
    );
    write_script(dir, "ffmpeg", &body)
}
