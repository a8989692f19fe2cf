mod test_detect;
mod test_xml;
