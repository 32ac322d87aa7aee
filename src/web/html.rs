//! HTML fragments for directory listings

/// HTML escape helper
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Underscores read as spaces in listings
fn display_name(name: &str) -> String {
    html_escape(&name.replace('_', " "))
}

/// Entry the client can drill into (`dir`) or play (`file`)
pub fn entry_item(class: &str, url: &str, name: &str) -> String {
    format!(
        r##"
<li>
<a href="#" data-url="{url}"
   class="{class}">{name}
</a>
</li>
"##,
        url = html_escape(url),
        class = class,
        name = display_name(name),
    )
}

/// Image entry with an inline base64 PNG thumbnail
pub fn image_item(show_url: &str, name: &str, png_base64: &str) -> String {
    format!(
        r##"
<li>
  <a href="show/file/{url}"
     class="img">
    <img src="data:image/png;base64,{src}"> {name}
  </a>
</li>
"##,
        url = html_escape(show_url),
        src = png_base64,
        name = display_name(name),
    )
}

/// Continuation marker: the next page starts at `after`
pub fn more_item(after: usize) -> String {
    format!(
        r##"
<li>
<a href="#" class="more" after="{}">
More
</a>
</li>
"##,
        after
    )
}
